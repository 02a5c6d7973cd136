//! Subdomain classification for hostname-scoped APIs.
//!
//! A domain "has a subdomain" when it has more labels than its registrable
//! (apex) domain. The apex is resolved against the Public Suffix List,
//! including its private section, so `example.com.uy` and
//! `example.github.io` are apex domains.

fn normalize(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Whether `domain` contains labels beyond its apex domain.
///
/// `example.com` and `example.co.uk` are apex domains;
/// `www.example.com` and `api.example.co.uk` have subdomains. A bare
/// public suffix has no subdomain.
pub fn has_subdomain(domain: &str) -> bool {
    let domain = normalize(domain);
    psl::domain_str(&domain).is_some_and(|apex| apex.len() < domain.len())
}

/// The apex (registrable) domain of `domain`.
///
/// Returns the normalized input when it is already an apex domain or a
/// bare suffix.
pub fn apex_domain(domain: &str) -> String {
    let domain = normalize(domain);
    match psl::domain_str(&domain) {
        Some(apex) => apex.to_string(),
        None => domain,
    }
}
