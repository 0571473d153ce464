//! Service identity aggregation with trust domain expansion

use std::collections::BTreeSet;

use meshreg_core::models::Service;
use meshreg_core::spiffe;

use super::controller::Controller;

impl Controller {
    /// SPIFFE identities backing `service` on `ports`, across all registries
    ///
    /// Identities in the mesh's primary trust domain are also returned under
    /// every configured trust domain alias, for example:
    /// - `spiffe://cluster.local/ns/default/sa/foo`
    /// - `spiffe://cluster.local/ns/default/sa/foo`, `spiffe://td-alias/ns/default/sa/foo`
    ///   when `td-alias` is configured
    ///
    /// The result is sorted, so it does not depend on registry order.
    #[must_use]
    pub fn service_accounts(&self, service: &Service, ports: &[u16]) -> Vec<String> {
        let identities: BTreeSet<String> = self
            .get_registries()
            .iter()
            .flat_map(|r| r.service_accounts(service, ports))
            .collect();

        // Read fresh: the mesh config may change between calls
        let mesh = self.mesh_holder.as_ref().and_then(|holder| holder.mesh());
        let (primary, aliases) = match mesh.as_deref() {
            Some(mesh) => (mesh.trust_domain.as_str(), mesh.trust_domain_aliases.as_slice()),
            None => ("", &[][..]),
        };

        let mut result: Vec<String> = spiffe::expand_with_trust_domains(&identities, primary, aliases)
            .into_iter()
            .collect();
        result.sort();
        result
    }
}
