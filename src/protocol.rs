use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Local;
use lazy_static::lazy_static;

use crate::error::DecodeError;
use crate::message::{Request, Response};

/// Terminates every request and every response on the wire.
pub const TERMINATOR: u8 = b'\r';

/// Translates requests to wire frames and wire frames to responses. Sessions only ever talk to
/// the server through this trait.
pub trait Codec: Send + Sync {
    /// Encodes a complete frame, terminator included. `sequence` counts the requests already
    /// sent on the connection.
    fn encode(&self, request: &Request, sequence: usize) -> Bytes;

    /// Decodes one frame, with or without its terminator.
    fn decode(&self, frame: &[u8]) -> Result<Response, DecodeError>;
}

/// Field values every outgoing message is built with unless the request says otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDefaults {
    pub renewal_policy: char,
    pub no_block: char,
    pub institution_id: String,
    pub terminal_password: String,
    pub uid_algorithm: char,
    pub pwd_algorithm: char,
}

impl Default for MessageDefaults {
    fn default() -> Self {
        Self {
            renewal_policy: 'Y',
            no_block: 'N',
            institution_id: String::new(),
            terminal_password: String::new(),
            uid_algorithm: '0',
            pwd_algorithm: '0',
        }
    }
}

lazy_static! {
    /// Fixed-length fields following the message id, per response message.
    static ref FIXED_LAYOUTS: HashMap<&'static str, &'static [(&'static str, usize)]> = {
        let mut layouts: HashMap<&'static str, &'static [(&'static str, usize)]> = HashMap::new();
        layouts.insert("94", &[("ok", 1)]);
        layouts.insert(
            "10",
            &[
                ("ok", 1),
                ("resensitize", 1),
                ("magnetic_media", 1),
                ("alert", 1),
                ("transaction_date", 18),
            ],
        );
        layouts.insert(
            "12",
            &[
                ("ok", 1),
                ("renewal_ok", 1),
                ("magnetic_media", 1),
                ("desensitize", 1),
                ("transaction_date", 18),
            ],
        );
        layouts.insert(
            "18",
            &[
                ("circulation_status", 2),
                ("security_marker", 2),
                ("fee_type", 2),
                ("transaction_date", 18),
            ],
        );
        layouts.insert("96", &[]);
        layouts
    };
}

const DATE_FORMAT: &str = "%Y%m%d    %H%M%S";
const BLANK_DATE: &str = "                  ";

/// SIP2 as spoken by self-check terminals.
#[derive(Clone, Debug, Default)]
pub struct Sip2Codec {
    defaults: MessageDefaults,
    error_detection: bool,
}

impl Sip2Codec {
    pub fn new(defaults: MessageDefaults) -> Self {
        Self {
            defaults,
            error_detection: false,
        }
    }

    /// Appends `AY`/`AZ` sequence and checksum fields to every request.
    pub fn with_error_detection(mut self, enabled: bool) -> Self {
        self.error_detection = enabled;
        self
    }

    fn body(&self, request: &Request, date: &str) -> String {
        let d = &self.defaults;

        match request {
            Request::Login { credential } => format!(
                "93{}{}CN{}|CO{}|",
                d.uid_algorithm, d.pwd_algorithm, credential.username, credential.password
            ),
            Request::CheckIn {
                item,
                current_location,
            } => format!(
                "09{}{date}{date}AP{current_location}|AO{}|AB{item}|AC{}|",
                d.no_block, d.institution_id, d.terminal_password
            ),
            Request::CheckOut {
                item,
                patron,
                current_location,
            } => format!(
                "11{}{}{date}{BLANK_DATE}AO{}|AA{patron}|AB{item}|AC{}|AP{current_location}|",
                d.renewal_policy, d.no_block, d.institution_id, d.terminal_password
            ),
            Request::ItemInformation { item } => format!(
                "17{date}AO{}|AB{item}|AC{}|",
                d.institution_id, d.terminal_password
            ),
        }
    }
}

/// Two's complement of the byte sum, as four upper-case hex digits.
pub fn checksum(bytes: &[u8]) -> String {
    let sum = bytes
        .iter()
        .fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)));
    format!("{:04X}", (!sum).wrapping_add(1))
}

impl Codec for Sip2Codec {
    fn encode(&self, request: &Request, sequence: usize) -> Bytes {
        let date = Local::now().format(DATE_FORMAT).to_string();
        let mut body = self.body(request, &date);

        if self.error_detection {
            body.push_str(&format!("AY{}AZ", sequence % 10));
            let sum = checksum(body.as_bytes());
            body.push_str(&sum);
        }

        let mut frame = BytesMut::with_capacity(body.len() + 1);
        frame.put_slice(body.as_bytes());
        frame.put_u8(TERMINATOR);
        frame.freeze()
    }

    fn decode(&self, frame: &[u8]) -> Result<Response, DecodeError> {
        let text = std::str::from_utf8(frame).map_err(|_| DecodeError::Utf8)?;
        let text = text.trim_start_matches('\n').trim_end_matches(['\r', '\n']);

        if text.len() < 2 || !text.is_char_boundary(2) {
            return Err(DecodeError::Empty);
        }

        let (id, rest) = text.split_at(2);
        let layout = FIXED_LAYOUTS
            .get(id)
            .ok_or_else(|| DecodeError::UnknownMessage(id.to_owned()))?;

        let mut fields = HashMap::new();
        let mut rest = rest;

        // AZ is always the last field and covers every byte before its value.
        if text.len() >= 6 && text.is_char_boundary(text.len() - 4) {
            let (signed, found) = text.split_at(text.len() - 4);

            if signed.ends_with("AZ") {
                let computed = checksum(signed.as_bytes());
                if !found.eq_ignore_ascii_case(&computed) {
                    return Err(DecodeError::Checksum {
                        found: found.to_owned(),
                        computed,
                    });
                }

                fields.insert("AZ".to_owned(), found.to_owned());
                rest = &rest[..rest.len() - 6];

                if rest.len() >= 3 && rest.is_char_boundary(rest.len() - 3) {
                    let (head, tail) = rest.split_at(rest.len() - 3);
                    if let Some(seq) = tail.strip_prefix("AY") {
                        fields.insert("AY".to_owned(), seq.to_owned());
                        rest = head;
                    }
                }
            }
        }

        let expected: usize = layout.iter().map(|(_, len)| len).sum();
        if rest.len() < expected || !rest.is_char_boundary(expected) {
            return Err(DecodeError::Truncated {
                id: id.to_owned(),
                expected,
                actual: rest.len(),
            });
        }

        // Field widths are byte counts, so the fixed part must be single-byte throughout.
        if !rest[..expected].is_ascii() {
            return Err(DecodeError::NonAsciiFixedFields(id.to_owned()));
        }

        let mut fixed = HashMap::new();
        let mut offset = 0;
        for (name, len) in layout.iter() {
            fixed.insert(*name, rest[offset..offset + len].to_owned());
            offset += len;
        }

        for field in rest[offset..].split('|') {
            if field.len() < 2 || !field.is_char_boundary(2) {
                continue;
            }

            let (code, value) = field.split_at(2);
            fields
                .entry(code.to_owned())
                .or_insert_with(|| value.to_owned());
        }

        Ok(Response {
            id: id.to_owned(),
            fixed,
            fields,
        })
    }
}
