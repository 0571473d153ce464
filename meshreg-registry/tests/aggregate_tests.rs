//! End-to-end behaviour of the aggregate controller over in-memory registries

use std::sync::Arc;

use meshreg_core::models::{
    ClusterId, Endpoint, Hostname, Labels, LabelsCollection, NetworkGateway, Port, Protocol, ProviderKind, Proxy,
    Service, ServiceInstance,
};
use meshreg_core::spiffe::SpiffeIdentity;
use meshreg_core::{MeshConfig, MeshHolder, MeshWatcher};
use meshreg_registry::{Controller, MemoryRegistry, Options, ServiceRegistry};

const FOO: &str = "foo.default.svc.cluster.local";
const HELLO: &str = "hello.default.svc.cluster.local";
const WORLD: &str = "world.default.svc.cluster.local";

fn http_port() -> Port {
    Port::new("http", 80, Protocol::Http)
}

fn service(hostname: &str, address: &str, cluster: &str) -> Service {
    Service::new(hostname, address, ClusterId::from(cluster))
        .with_namespace("default")
        .with_ports(vec![http_port()])
}

fn instance(svc: &Service, ip: &str, service_account: &str) -> ServiceInstance {
    ServiceInstance {
        service: Arc::new(svc.clone()),
        service_port: http_port(),
        endpoint: Endpoint {
            address: ip.to_string(),
            endpoint_port: 8080,
            labels: Labels::from([("app".to_string(), "foo".to_string())]),
            service_account: service_account.to_string(),
            ..Endpoint::default()
        },
    }
}

/// Two Kubernetes clusters both running `foo`, plus their own services
fn two_cluster_setup() -> (Controller, Arc<MemoryRegistry>, Arc<MemoryRegistry>) {
    let c1 = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::Kubernetes));
    let foo_v1 = service(FOO, "10.3.0.0", "cluster-1");
    c1.add_service(service(HELLO, "10.1.0.0", "cluster-1"));
    c1.add_service(foo_v1.clone());
    c1.add_instance(instance(&foo_v1, "10.3.1.1", "spiffe://cluster.local/ns/default/sa/foo1"));
    c1.add_instance(instance(&foo_v1, "10.3.1.2", "spiffe://cluster.local/ns/default/sa/foo-share"));

    let c2 = Arc::new(MemoryRegistry::new("cluster-2", ProviderKind::Kubernetes));
    let foo_v2 = service(FOO, "10.3.0.1", "cluster-2");
    c2.add_service(service(WORLD, "10.2.0.0", "cluster-2"));
    c2.add_service(foo_v2.clone());
    c2.add_instance(instance(&foo_v2, "10.3.2.1", "spiffe://cluster.local/ns/default/sa/foo2"));
    c2.add_instance(instance(&foo_v2, "10.3.2.2", "spiffe://cluster.local/ns/default/sa/foo-share"));

    let controller = Controller::new(Options::default());
    controller.add_registry(c1.clone());
    controller.add_registry(c2.clone());
    (controller, c1, c2)
}

fn hostnames(services: &[Arc<Service>]) -> Vec<&str> {
    services.iter().map(|s| s.hostname.as_str()).collect()
}

#[test]
fn services_merge_kubernetes_hostnames() {
    let (controller, _, _) = two_cluster_setup();

    let (services, err) = controller.services();
    assert!(err.is_none());
    assert_eq!(hostnames(&services), vec![HELLO, FOO, WORLD]);

    let foo = &services[1];
    assert_eq!(foo.address, "10.3.0.0");
    assert_eq!(foo.cluster_vips.addresses_for(&ClusterId::from("cluster-1")), ["10.3.0.0".to_string()]);
    assert_eq!(foo.cluster_vips.addresses_for(&ClusterId::from("cluster-2")), ["10.3.0.1".to_string()]);
}

#[test]
fn merge_does_not_touch_registry_copies() {
    let (controller, c1, _) = two_cluster_setup();

    let (services, _) = controller.services();
    assert_eq!(services[1].cluster_vips.len(), 2);
    let (merged, _) = controller.get_service(&Hostname::from(FOO));
    assert_eq!(merged.unwrap().cluster_vips.len(), 2);

    let original = c1.get_service(&Hostname::from(FOO)).unwrap().unwrap();
    assert_eq!(original.cluster_vips.len(), 1);
    assert!(original
        .cluster_vips
        .addresses_for(&ClusterId::from("cluster-2"))
        .is_empty());
}

#[test]
fn merge_is_idempotent_for_identical_copies() {
    let c1 = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::Kubernetes));
    let c1_again = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::Kubernetes));
    c1.add_service(service(FOO, "10.3.0.0", "cluster-1"));
    c1_again.add_service(service(FOO, "10.3.0.0", "cluster-1"));

    let controller = Controller::new(Options::default());
    controller.add_registry(c1);
    controller.add_registry(c1_again);

    let (services, _) = controller.services();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].cluster_vips, service(FOO, "10.3.0.0", "cluster-1").cluster_vips);
}

#[test]
fn get_service_primary_cluster_wins() {
    let (controller, _, _) = two_cluster_setup();

    let (svc, err) = controller.get_service(&Hostname::from(FOO));
    assert!(err.is_none());
    let svc = svc.unwrap();

    // Non-VIP fields come from the first registry added
    assert_eq!(svc.address, "10.3.0.0");
    assert_eq!(svc.namespace, "default");
    assert_eq!(svc.cluster_vips.addresses_for(&ClusterId::from("cluster-1")), ["10.3.0.0".to_string()]);
    assert_eq!(svc.cluster_vips.addresses_for(&ClusterId::from("cluster-2")), ["10.3.0.1".to_string()]);

    let (missing, err) = controller.get_service(&Hostname::from("nope.svc"));
    assert!(missing.is_none());
    assert!(err.is_none());
}

#[test]
fn non_kubernetes_services_are_never_merged() {
    let se1 = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::ServiceEntry));
    let se2 = Arc::new(MemoryRegistry::new("cluster-2", ProviderKind::External));
    se1.add_service(service(FOO, "240.0.0.1", ""));
    se2.add_service(service(FOO, "240.0.0.2", ""));

    let controller = Controller::new(Options::default());
    controller.add_registry(se1);
    controller.add_registry(se2);

    let (services, err) = controller.services();
    assert!(err.is_none());
    assert_eq!(hostnames(&services), vec![FOO, FOO]);
    assert_eq!(services[0].address, "240.0.0.1");
    assert_eq!(services[1].address, "240.0.0.2");

    // First non-Kubernetes hit is returned directly
    let (svc, _) = controller.get_service(&Hostname::from(FOO));
    assert_eq!(svc.unwrap().address, "240.0.0.1");
}

#[test]
fn mixed_provider_order_is_preserved() {
    let kube = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::Kubernetes));
    let se = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::ServiceEntry));
    let kube2 = Arc::new(MemoryRegistry::new("cluster-2", ProviderKind::Kubernetes));
    kube.add_service(service(FOO, "10.3.0.0", "cluster-1"));
    se.add_service(service("ext.example.com", "240.0.0.1", ""));
    se.add_service(service(FOO, "240.0.0.9", ""));
    kube2.add_service(service(WORLD, "10.2.0.0", "cluster-2"));
    kube2.add_service(service(FOO, "10.3.0.1", "cluster-2"));

    let controller = Controller::new(Options::default());
    controller.add_registry(kube);
    controller.add_registry(se);
    controller.add_registry(kube2);

    let (services, _) = controller.services();
    assert_eq!(hostnames(&services), vec![FOO, "ext.example.com", FOO, WORLD]);
    assert_eq!(services[0].cluster_vips.len(), 2);
    assert_eq!(services[2].address, "240.0.0.9");
}

#[test]
fn partial_failure_returns_remaining_services() {
    let r1 = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::Kubernetes));
    let r2 = Arc::new(MemoryRegistry::new("cluster-2", ProviderKind::Kubernetes));
    let r3 = Arc::new(MemoryRegistry::new("cluster-3", ProviderKind::ServiceEntry));
    r1.add_service(service(HELLO, "10.1.0.0", "cluster-1"));
    r2.add_service(service(WORLD, "10.2.0.0", "cluster-2"));
    r3.add_service(service("ext.example.com", "240.0.0.1", ""));
    r2.fail_services(Some("apiserver unavailable".to_string()));

    let controller = Controller::new(Options::default());
    controller.add_registry(r1);
    controller.add_registry(r2);
    controller.add_registry(r3);

    let (services, err) = controller.services();
    assert_eq!(hostnames(&services), vec![HELLO, "ext.example.com"]);
    let err = err.expect("combined error");
    assert_eq!(err.len(), 1);
    assert_eq!(err.failures[0].cluster, ClusterId::from("cluster-2"));

    let (svc, err) = controller.get_service(&Hostname::from(HELLO));
    assert_eq!(svc.unwrap().address, "10.1.0.0");
    assert_eq!(err.unwrap().len(), 1);
}

#[test]
fn get_service_non_kubernetes_hit_drops_earlier_errors() {
    let broken = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::Kubernetes));
    let se = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::ServiceEntry));
    broken.add_service(service(FOO, "10.3.0.0", "cluster-1"));
    broken.fail_services(Some("apiserver unavailable".to_string()));
    se.add_service(service(FOO, "240.0.0.9", ""));

    let controller = Controller::new(Options::default());
    controller.add_registry(broken);
    controller.add_registry(se);

    let (svc, err) = controller.get_service(&Hostname::from(FOO));
    assert_eq!(svc.unwrap().address, "240.0.0.9");
    assert!(err.is_none());

    // The listing still reports the failure
    let (_, err) = controller.services();
    assert_eq!(err.unwrap().len(), 1);
}

#[test]
fn get_service_non_kubernetes_hit_replaces_merged_copy() {
    let kube1 = Arc::new(MemoryRegistry::new("cluster-1", ProviderKind::Kubernetes));
    let kube2 = Arc::new(MemoryRegistry::new("cluster-2", ProviderKind::Kubernetes));
    let se = Arc::new(MemoryRegistry::new("cluster-3", ProviderKind::ServiceEntry));
    kube1.add_service(service(FOO, "10.3.0.0", "cluster-1"));
    kube2.add_service(service(FOO, "10.3.0.1", "cluster-2"));
    se.add_service(service(FOO, "240.0.0.9", ""));

    let controller = Controller::new(Options::default());
    controller.add_registry(kube1);
    controller.add_registry(kube2);
    controller.add_registry(se);

    let (svc, err) = controller.get_service(&Hostname::from(FOO));
    assert!(err.is_none());
    let svc = svc.unwrap();
    assert_eq!(svc.address, "240.0.0.9");
    assert!(svc.cluster_vips.is_empty());
}

#[test]
fn gateways_and_instances_concatenate_in_registry_order() {
    let (controller, c1, c2) = two_cluster_setup();
    c1.add_gateway(NetworkGateway {
        network: "net-1".to_string(),
        cluster: ClusterId::from("cluster-1"),
        address: "35.0.0.1".to_string(),
        port: 15443,
    });
    c2.add_gateway(NetworkGateway {
        network: "net-2".to_string(),
        cluster: ClusterId::from("cluster-2"),
        address: "35.0.0.2".to_string(),
        port: 15443,
    });

    let gateways: Vec<String> = controller.network_gateways().into_iter().map(|g| g.network).collect();
    assert_eq!(gateways, vec!["net-1".to_string(), "net-2".to_string()]);

    let foo = service(FOO, "10.3.0.0", "cluster-1");
    let instances = controller.instances_by_port(&foo, 80, &LabelsCollection::new());
    let addrs: Vec<&str> = instances.iter().map(|i| i.endpoint.address.as_str()).collect();
    assert_eq!(addrs, vec!["10.3.1.1", "10.3.1.2", "10.3.2.1", "10.3.2.2"]);

    let other = LabelsCollection::from(Labels::from([("app".to_string(), "bar".to_string())]));
    assert!(controller.instances_by_port(&foo, 80, &other).is_empty());
}

#[test]
fn proxy_instances_skip_other_kubernetes_clusters() {
    let k1 = Arc::new(MemoryRegistry::new("c1", ProviderKind::Kubernetes));
    let k2 = Arc::new(MemoryRegistry::new("c2", ProviderKind::Kubernetes));
    let se = Arc::new(MemoryRegistry::new("se", ProviderKind::ServiceEntry));
    let ip = "10.9.0.1";
    // All three registries claim the same proxy IP
    k1.add_instance(instance(&service("a.svc", "10.0.0.1", "c1"), ip, ""));
    k2.add_instance(instance(&service("b.svc", "10.0.0.2", "c2"), ip, ""));
    se.add_instance(instance(&service("c.svc", "240.0.0.1", ""), ip, ""));

    let controller = Controller::new(Options::default());
    controller.add_registry(k1);
    controller.add_registry(k2);
    controller.add_registry(se);

    let proxy = Proxy::new("p1", vec![ip.to_string()]).in_cluster("c1");
    let hosts: Vec<String> = controller
        .get_proxy_service_instances(&proxy)
        .iter()
        .map(|i| i.service.hostname.to_string())
        .collect();
    assert_eq!(hosts, vec!["a.svc".to_string(), "c.svc".to_string()]);

    let unpinned = Proxy::new("p1", vec![ip.to_string()]);
    assert_eq!(controller.get_proxy_service_instances(&unpinned).len(), 3);
}

#[test]
fn proxy_labels_first_match_wins() {
    let k1 = Arc::new(MemoryRegistry::new("c1", ProviderKind::Kubernetes));
    let k2 = Arc::new(MemoryRegistry::new("c2", ProviderKind::Kubernetes));
    let ip = "10.9.0.1";
    k2.set_proxy_labels(ip, Labels::from([("app".to_string(), "from-c2".to_string())]));

    let controller = Controller::new(Options::default());
    controller.add_registry(k1.clone());
    controller.add_registry(k2);

    // Unknown cluster: k1 has nothing, so k2 answers
    let proxy = Proxy::new("p1", vec![ip.to_string()]);
    let labels = controller.get_proxy_workload_labels(&proxy);
    assert_eq!(labels.len(), 1);
    assert_eq!(labels.0[0].get("app").map(String::as_str), Some("from-c2"));

    // Once k1 answers too it wins, with no union
    k1.set_proxy_labels(ip, Labels::from([("app".to_string(), "from-c1".to_string())]));
    let labels = controller.get_proxy_workload_labels(&proxy);
    assert_eq!(labels.len(), 1);
    assert_eq!(labels.0[0].get("app").map(String::as_str), Some("from-c1"));
}

#[test]
fn proxy_labels_with_cluster_only_ask_that_cluster() {
    let k1 = Arc::new(MemoryRegistry::new("c1", ProviderKind::Kubernetes));
    let k2 = Arc::new(MemoryRegistry::new("c2", ProviderKind::Kubernetes));
    let ip = "10.9.0.1";
    k2.set_proxy_labels(ip, Labels::from([("app".to_string(), "from-c2".to_string())]));

    let controller = Controller::new(Options::default());
    controller.add_registry(k1);
    controller.add_registry(k2);

    let in_c1 = Proxy::new("p1", vec![ip.to_string()]).in_cluster("c1");
    assert!(controller.get_proxy_workload_labels(&in_c1).is_empty());

    let in_c2 = Proxy::new("p1", vec![ip.to_string()]).in_cluster("c2");
    assert_eq!(controller.get_proxy_workload_labels(&in_c2).len(), 1);

    let in_c3 = Proxy::new("p1", vec![ip.to_string()]).in_cluster("c3");
    assert!(controller.get_proxy_workload_labels(&in_c3).is_empty());
}

#[test]
fn service_accounts_union_without_mesh_holder() {
    let (controller, _, _) = two_cluster_setup();
    let foo = service(FOO, "10.3.0.0", "cluster-1");

    assert_eq!(
        controller.service_accounts(&foo, &[]),
        vec![
            "spiffe://cluster.local/ns/default/sa/foo-share".to_string(),
            "spiffe://cluster.local/ns/default/sa/foo1".to_string(),
            "spiffe://cluster.local/ns/default/sa/foo2".to_string(),
        ]
    );
}

#[test]
fn service_accounts_expand_trust_domain_aliases() {
    let (base, c1, c2) = two_cluster_setup();
    drop(base);
    let mesh = Arc::new(MeshWatcher::new(Some(MeshConfig {
        trust_domain: "cluster.local".to_string(),
        trust_domain_aliases: vec!["alias.td".to_string()],
    })));

    let build = |first: Arc<MemoryRegistry>, second: Arc<MemoryRegistry>| {
        let controller = Controller::new(Options {
            mesh_holder: Some(mesh.clone() as Arc<dyn MeshHolder>),
        });
        controller.add_registry(first);
        controller.add_registry(second);
        controller
    };
    let forward = build(c1.clone(), c2.clone());
    let reverse = build(c2, c1);

    let foo = service(FOO, "10.3.0.0", "cluster-1");
    let expected = vec![
        "spiffe://alias.td/ns/default/sa/foo-share".to_string(),
        "spiffe://alias.td/ns/default/sa/foo1".to_string(),
        "spiffe://alias.td/ns/default/sa/foo2".to_string(),
        "spiffe://cluster.local/ns/default/sa/foo-share".to_string(),
        "spiffe://cluster.local/ns/default/sa/foo1".to_string(),
        "spiffe://cluster.local/ns/default/sa/foo2".to_string(),
    ];
    assert_eq!(forward.service_accounts(&foo, &[80]), expected);
    assert_eq!(forward.service_accounts(&foo, &[80]), expected);
    assert_eq!(reverse.service_accounts(&foo, &[80]), expected);

    // Config is read on every call
    mesh.update(None);
    assert_eq!(forward.service_accounts(&foo, &[80]).len(), 3);
}

#[test]
fn service_accounts_skip_malformed_aliases() {
    let (base, c1, c2) = two_cluster_setup();
    drop(base);
    let mesh = Arc::new(MeshWatcher::new(Some(MeshConfig {
        trust_domain: "cluster.local".to_string(),
        trust_domain_aliases: vec!["bad/td".to_string(), "Has Space".to_string(), "alias.td".to_string()],
    })));
    let controller = Controller::new(Options {
        mesh_holder: Some(mesh as Arc<dyn MeshHolder>),
    });
    controller.add_registry(c1);
    controller.add_registry(c2);

    let foo = service(FOO, "10.3.0.0", "cluster-1");
    let accounts = controller.service_accounts(&foo, &[]);
    assert_eq!(accounts.len(), 6);
    for account in &accounts {
        assert!(SpiffeIdentity::parse(account).is_ok(), "{account} should parse");
    }
    assert!(accounts.iter().all(|a| !a.contains("bad/td") && !a.contains("Has Space")));
}

#[test]
fn delete_registry_removes_its_services() {
    let (controller, _, _) = two_cluster_setup();
    controller.delete_registry(&ClusterId::from("cluster-2"), ProviderKind::Kubernetes);

    let (services, _) = controller.services();
    assert_eq!(hostnames(&services), vec![HELLO, FOO]);
    assert_eq!(services[1].cluster_vips.len(), 1);

    controller.delete_registry(&ClusterId::from("cluster-2"), ProviderKind::Kubernetes);
    assert_eq!(controller.get_registries().len(), 1);
}

#[test]
fn concurrent_reads_during_registry_churn() {
    let (controller, _, _) = two_cluster_setup();
    let controller = Arc::new(controller);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let controller = controller.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    let (services, err) = controller.services();
                    assert!(err.is_none());
                    assert!(services.iter().any(|s| s.hostname.as_str() == HELLO));
                }
            });
        }
        let controller = controller.clone();
        scope.spawn(move || {
            for i in 0..200 {
                let cluster = format!("extra-{i}");
                controller.add_registry(Arc::new(MemoryRegistry::new(cluster.as_str(), ProviderKind::Kubernetes)));
                controller.delete_registry(&ClusterId::from(cluster), ProviderKind::Kubernetes);
            }
        });
    });

    assert_eq!(controller.get_registries().len(), 2);
}
