use base64::{engine::general_purpose::STANDARD, Engine};

/// An image carried as `data:<mime>;base64,<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    /// Base64 text, still encoded.
    pub payload: String,
}

impl DataUrl {
    /// Encode raw bytes, e.g. a JPEG produced from the canvas.
    pub fn encode(mime: &str, bytes: &[u8]) -> Self {
        Self {
            mime: mime.to_string(),
            payload: STANDARD.encode(bytes),
        }
    }
}

impl std::fmt::Display for DataUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, self.payload)
    }
}

/// The base64 payload the vision backend wants: everything after the
/// first comma of a data URL, or the input unchanged when it carries no
/// `data:` scheme.
pub fn strip_data_url_prefix(image: &str) -> &str {
    if image.starts_with("data:") {
        if let Some((_, payload)) = image.split_once(',') {
            return payload;
        }
    }
    image
}
