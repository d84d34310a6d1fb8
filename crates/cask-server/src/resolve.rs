/// Longest prefix the resolver ever inspects.
pub const SNIFF_LEN: usize = 5;

const XML_DECLARATION: &[u8; 5] = b"<?xml";
const XML_MIME: &str = "application/xml";
const OCTET_STREAM: &str = "application/octet-stream";

// Some sniffing databases label raw Adobe photos with a generic raw type;
// clients expect the vendor-specific DNG alias.
const RAW_ADOBE: &str = "image/x-raw-adobe";
const DNG_ALIAS: &str = "image/x-adobe-dng";

/// Determine the content type to report for a stored file.
///
/// `head` is the file's leading bytes (at most [`SNIFF_LEN`] are inspected;
/// byte-for-byte comparison, so no sequence can fault decoding). An XML
/// declaration short-circuits to `application/xml`; everything else goes
/// through the generic sniffer keyed on the file name, with the raw-Adobe
/// remap applied to its answer.
pub fn resolve_content_type(head: &[u8], file_name: &str) -> String {
    if head.len() >= SNIFF_LEN && &head[..SNIFF_LEN] == XML_DECLARATION {
        return XML_MIME.to_string();
    }
    let sniffed = mime_guess::from_path(file_name)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string());
    remap_sniffed(&sniffed).to_string()
}

fn remap_sniffed(mime: &str) -> &str {
    if mime == RAW_ADOBE {
        DNG_ALIAS
    } else {
        mime
    }
}
