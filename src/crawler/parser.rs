//! Trading API response parser
//!
//! This module turns the XML body of a listing call into:
//! - the acknowledgement status and structured error list
//! - the declared page count
//! - the listing items with their deduplicated image URLs
//!
//! The reader is event based and only looks at local element names, so the
//! `urn:ebay:apis:eBLBaseComponents` default namespace needs no handling.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Error codes the provider uses for invalid or expired tokens
const TOKEN_ERROR_CODES: &[u32] = &[931, 932, 17470, 21916984, 21917053];

/// Message fragments that identify a token failure when no known code is
/// present. Provider-specific and matched case-insensitively.
const TOKEN_ERROR_PHRASES: &[&str] = &["iaf token", "token has expired", "hard expired"];

/// Errors raised while reading a response body
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Response carries no Ack element")]
    MissingAck,
}

/// Acknowledgement status of a Trading API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Success,
    Warning,
    Failure,
    PartialFailure,
    Other(String),
}

impl Ack {
    fn parse(value: &str) -> Self {
        match value {
            "Success" => Self::Success,
            "Warning" => Self::Warning,
            "Failure" => Self::Failure,
            "PartialFailure" => Self::PartialFailure,
            other => Self::Other(other.to_string()),
        }
    }

    /// True when the call's payload can be used
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Warning)
    }
}

/// One entry of the response's `Errors` list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiErrorDetail {
    pub code: Option<u32>,
    pub severity: String,
    pub short_message: String,
    pub long_message: String,
}

impl ApiErrorDetail {
    /// True when this error reports an invalid or expired token
    pub fn is_token_error(&self) -> bool {
        if let Some(code) = self.code {
            if TOKEN_ERROR_CODES.contains(&code) {
                return true;
            }
        }

        let short = self.short_message.to_ascii_lowercase();
        let long = self.long_message.to_ascii_lowercase();
        TOKEN_ERROR_PHRASES
            .iter()
            .any(|phrase| short.contains(phrase) || long.contains(phrase))
    }
}

impl std::fmt::Display for ApiErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] ", code)?,
            None => write!(f, "[?] ")?,
        }
        write!(f, "{} {}", self.severity, self.short_message)?;
        if !self.long_message.is_empty() && self.long_message != self.short_message {
            write!(f, " ({})", self.long_message)?;
        }
        Ok(())
    }
}

/// A listing as returned by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    /// Provider-assigned item id; empty when the record is malformed
    pub id: String,

    pub sku: Option<String>,

    /// Picture URLs followed by the gallery URL, deduplicated in order
    pub image_urls: Vec<String>,
}

/// Everything the crawler needs from one response
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub ack: Ack,
    pub errors: Vec<ApiErrorDetail>,

    /// `PaginationResult/TotalNumberOfPages`, when present and numeric
    pub total_pages: Option<u32>,

    pub items: Vec<ListingItem>,
}

impl ParsedResponse {
    /// True when the call failed because of the token
    pub fn is_token_failure(&self) -> bool {
        !self.ack.is_success() && self.errors.iter().any(ApiErrorDetail::is_token_error)
    }

    /// Joined error details for logging
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "Unknown error.".to_string();
        }
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Item being assembled while its element is open
struct OpenItem {
    depth: usize,
    id: String,
    sku: String,
    pictures: Vec<String>,
    gallery: Option<String>,
}

impl OpenItem {
    fn finish(self) -> ListingItem {
        let mut image_urls: Vec<String> = Vec::with_capacity(self.pictures.len() + 1);
        for url in self.pictures.into_iter().chain(self.gallery) {
            if !url.is_empty() && !image_urls.contains(&url) {
                image_urls.push(url);
            }
        }

        ListingItem {
            id: self.id,
            sku: Some(self.sku).filter(|s| !s.is_empty()),
            image_urls,
        }
    }
}

/// Parses a Trading API response body
///
/// # Extraction Rules
///
/// - `Ack`, `Errors/*` and `PaginationResult/TotalNumberOfPages` are read
///   outside of items; the first page count wins
/// - every `Item` element becomes a [`ListingItem`], wherever it is nested
///   (selling lists wrap items in transactions)
/// - `ItemID` and `SKU` are only taken from direct children of `Item`, so
///   variation SKUs never replace the listing's SKU
/// - image URLs are the `PictureDetails/PictureURL` values followed by the
///   first `PictureDetails/GalleryURL`
///
/// # Example
///
/// ```
/// use listing_archiver::crawler::parse_response;
///
/// let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
/// <GetSellerListResponse xmlns="urn:ebay:apis:eBLBaseComponents">
///   <Ack>Success</Ack>
///   <PaginationResult><TotalNumberOfPages>1</TotalNumberOfPages></PaginationResult>
///   <ItemArray><Item><ItemID>110</ItemID><SKU>MUG-1</SKU>
///     <PictureDetails><PictureURL>https://i.example.com/a.jpg</PictureURL></PictureDetails>
///   </Item></ItemArray>
/// </GetSellerListResponse>"#;
/// let parsed = parse_response(xml).unwrap();
/// assert_eq!(parsed.total_pages, Some(1));
/// assert_eq!(parsed.items[0].sku.as_deref(), Some("MUG-1"));
/// ```
pub fn parse_response(xml: &str) -> Result<ParsedResponse, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut ack: Option<Ack> = None;
    let mut errors: Vec<ApiErrorDetail> = Vec::new();
    let mut total_pages: Option<u32> = None;
    let mut items: Vec<ListingItem> = Vec::new();
    let mut open_item: Option<OpenItem> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                text.clear();

                if name == "Item" && open_item.is_none() {
                    open_item = Some(OpenItem {
                        depth: stack.len(),
                        id: String::new(),
                        sku: String::new(),
                        pictures: Vec::new(),
                        gallery: None,
                    });
                } else if name == "Errors" && open_item.is_none() {
                    errors.push(ApiErrorDetail::default());
                }

                stack.push(name);
            }
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    continue;
                };
                let parent = stack.last().map(String::as_str).unwrap_or("");
                let value = std::mem::take(&mut text);

                match open_item.as_mut() {
                    Some(item) if name == "Item" && stack.len() == item.depth => {
                        if let Some(done) = open_item.take() {
                            items.push(done.finish());
                        }
                    }
                    Some(item) => {
                        let direct_child = stack.len() == item.depth + 1;
                        match name.as_str() {
                            "ItemID" if direct_child => item.id = value,
                            "SKU" if direct_child => item.sku = value,
                            "PictureURL" if parent == "PictureDetails" => item.pictures.push(value),
                            "GalleryURL" if parent == "PictureDetails" && item.gallery.is_none() => {
                                item.gallery = Some(value)
                            }
                            _ => {}
                        }
                    }
                    None => match name.as_str() {
                        "Ack" if stack.len() == 1 => ack = Some(Ack::parse(&value)),
                        "TotalNumberOfPages" if parent == "PaginationResult" => {
                            if total_pages.is_none() {
                                total_pages = value.parse().ok();
                            }
                        }
                        "ErrorCode" | "SeverityCode" | "ShortMessage" | "LongMessage"
                            if parent == "Errors" =>
                        {
                            if let Some(detail) = errors.last_mut() {
                                match name.as_str() {
                                    "ErrorCode" => detail.code = value.parse().ok(),
                                    "SeverityCode" => detail.severity = value,
                                    "ShortMessage" => detail.short_message = value,
                                    _ => detail.long_message = value,
                                }
                            }
                        }
                        _ => {}
                    },
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let ack = ack.ok_or(ParseError::MissingAck)?;

    Ok(ParsedResponse {
        ack,
        errors,
        total_pages,
        items,
    })
}
