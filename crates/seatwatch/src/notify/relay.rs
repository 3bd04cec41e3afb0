//! Static relay selection tables.
//!
//! Mail is handed straight to the recipient provider's inbound relay, so the
//! relay is guessed from the address. When port 25 is blocked the sender's
//! ISP relay is used instead.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Relay used for any domain label not in [`PROVIDER_RELAYS`].
pub const DEFAULT_RELAY: &str = "gmail-smtp-in.l.google.com";

/// Inbound relays keyed by the address's domain label.
static PROVIDER_RELAYS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("hotmail", "hotmail-com.olc.protection.outlook.com"),
        ("outlook", "outlook-com.olc.protection.outlook.com"),
        ("live", "live-com.olc.protection.outlook.com"),
        ("mail", "mx00.mail.com"),
        ("yahoo", "mta5.am0.yahoodns.net"),
        ("icloud", "mx1.mail.icloud.com"),
        ("uvic", "smtpy.uvic.ca"),
    ])
});

/// ISP relays, matched in order against the lower-cased ISP name.
const ISP_RELAYS: &[(&str, &str)] = &[
    ("telus", "mail.telus.net"),
    ("shaw", "mail.shaw.ca"),
    ("lightspeed", "mail.lightspeed.ca"),
    ("at&t", "smtp1.attglobal.net"),
    ("dccnet", "mail.dccnet.com"),
];

/// Returns the text between `@` and the next `.`, lower-cased.
///
/// Only the first label is kept, so `user@mail.co.uk` gives `mail`.
pub fn domain_label(address: &str) -> String {
    let Some((_, domain)) = address.split_once('@') else {
        return String::new();
    };
    domain
        .split('.')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Picks the provider relay for an address. Never fails.
pub fn relay_for_address(address: &str) -> &'static str {
    PROVIDER_RELAYS
        .get(domain_label(address).as_str())
        .copied()
        .unwrap_or(DEFAULT_RELAY)
}

/// Picks an ISP relay from the ISP name reported by the lookup service.
pub fn relay_for_isp(isp_name: &str) -> Option<&'static str> {
    let lower = isp_name.to_lowercase();
    ISP_RELAYS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, relay)| *relay)
}
