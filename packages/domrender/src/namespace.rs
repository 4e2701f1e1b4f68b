/// Expand a namespace prefix to its URI. Anything that is not a known prefix
/// is assumed to already be a URI and is returned as is.
pub fn namespace_to_uri(namespace: &str) -> &str {
    match namespace {
        "html" => "http://www.w3.org/1999/xhtml",
        "math" => "http://www.w3.org/1998/Math/MathML",
        "svg" => "http://www.w3.org/2000/svg",
        "xlink" => "http://www.w3.org/1999/xlink",
        "xml" => "http://www.w3.org/XML/1998/namespace",
        "xmlns" => "http://www.w3.org/2000/xmlns/",
        other => other,
    }
}
