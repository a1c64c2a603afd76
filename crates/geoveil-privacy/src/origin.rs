//! Origin identity derivation

use url::Url;

/// Origin identity (`scheme://host[:port]`) of a document URL.
///
/// Unparseable URLs and opaque origins (`data:`, `about:blank`, ...) yield
/// the empty identity, which always resolves to the global policy.
pub fn origin_of(document_url: &str) -> String {
    let Ok(parsed) = Url::parse(document_url) else {
        return String::new();
    };

    let origin = parsed.origin();
    if origin.is_tuple() {
        origin.ascii_serialization()
    } else {
        String::new()
    }
}
