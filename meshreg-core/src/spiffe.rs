//! SPIFFE workload identities and trust domain expansion
//!
//! Identities have the form `spiffe://<trust-domain>/ns/<namespace>/sa/<account>`.
//! Anything else (e.g. `spiffe://cluster.local/bar@iam.gserviceaccount.com`) is
//! carried around opaquely and never rewritten.

use ::spiffe::{SpiffeId, TrustDomain};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const URI_PREFIX: &str = "spiffe://";

/// Check that `name` is a bare SPIFFE trust domain name
///
/// `TrustDomain::new` also accepts a full SPIFFE ID, which would end up
/// nested inside another URI here, so that form is rejected first.
pub fn validate_trust_domain(name: &str) -> Result<()> {
    if name.starts_with(URI_PREFIX) {
        return Err(Error::InvalidIdentity(format!(
            "trust domain must be a bare name, got {name}"
        )));
    }
    TrustDomain::new(name)
        .map(|_| ())
        .map_err(|e| Error::InvalidIdentity(format!("trust domain {name:?}: {e}")))
}

/// Parsed Kubernetes-style SPIFFE identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpiffeIdentity {
    pub trust_domain: String,
    pub namespace: String,
    pub service_account: String,
}

impl SpiffeIdentity {
    pub fn parse(id: &str) -> Result<Self> {
        // Trust domain and path characters are checked by the spiffe crate;
        // only the ns/sa layout is ours.
        SpiffeId::new(id).map_err(|e| Error::InvalidIdentity(format!("{id}: {e}")))?;

        let rest = id
            .strip_prefix(URI_PREFIX)
            .ok_or_else(|| Error::InvalidIdentity(format!("missing {URI_PREFIX} prefix: {id}")))?;

        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [td, "ns", ns, "sa", sa] if !ns.is_empty() && !sa.is_empty() => Ok(Self {
                trust_domain: (*td).to_string(),
                namespace: (*ns).to_string(),
                service_account: (*sa).to_string(),
            }),
            _ => Err(Error::InvalidIdentity(format!(
                "expected {URI_PREFIX}<trust-domain>/ns/<namespace>/sa/<account>, got {id}"
            ))),
        }
    }

    /// Same identity under another trust domain
    pub fn with_trust_domain(&self, trust_domain: &str) -> Result<Self> {
        validate_trust_domain(trust_domain)?;
        Ok(Self {
            trust_domain: trust_domain.to_string(),
            ..self.clone()
        })
    }
}

impl std::fmt::Display for SpiffeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{URI_PREFIX}{}/ns/{}/sa/{}",
            self.trust_domain, self.namespace, self.service_account
        )
    }
}

/// Expand identities with trust domain aliases
///
/// Every input is kept. Each input whose trust domain is `primary` also yields
/// one identity per valid alias with the trust domain substituted. Identities
/// that do not parse are kept as-is; invalid aliases are skipped.
#[must_use]
pub fn expand_with_trust_domains<'a, I>(identities: I, primary: &str, aliases: &[String]) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let aliases: Vec<&String> = aliases
        .iter()
        .filter(|alias| match validate_trust_domain(alias) {
            Ok(()) => true,
            Err(e) => {
                warn!(alias = %alias, error = %e, "Ignoring invalid trust domain alias");
                false
            }
        })
        .collect();

    let mut out = BTreeSet::new();
    for id in identities {
        out.insert(id.clone());
        if aliases.is_empty() {
            continue;
        }

        let parsed = match SpiffeIdentity::parse(id) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(identity = %id, error = %e, "Skipping trust domain expansion");
                continue;
            }
        };
        if parsed.trust_domain != primary {
            continue;
        }
        for alias in &aliases {
            if let Ok(expanded) = parsed.with_trust_domain(alias) {
                out.insert(expanded.to_string());
            }
        }
    }
    out
}
