//! HTTP Digest access authentication (RFC 7616, MD5 only)

use crate::error::{Result, SyncError};

/// Parsed `WWW-Authenticate: Digest ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    /// Offered qop options, e.g. `["auth", "auth-int"]`
    pub qop: Vec<String>,
    pub algorithm: Option<String>,
}

/// Client-chosen values for one authorization
#[derive(Debug, Clone)]
pub struct DigestRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub method: &'a str,
    /// Request target exactly as sent: path plus query
    pub uri: &'a str,
    pub cnonce: &'a str,
    pub nc: u32,
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Split `key=value, key="quoted, value"` pairs
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.trim().is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        },
                        '"' => break,
                        _ => value.push(c),
                    }
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
            }
        }
        params.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    params
}

impl DigestChallenge {
    /// Parse a header value; `None` unless it is a Digest challenge with realm and nonce
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop = Vec::new();
        let mut algorithm = None;

        for (key, value) in parse_params(rest) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "algorithm" => algorithm = Some(value),
                "qop" => {
                    qop = value
                        .split(',')
                        .map(|q| q.trim().to_ascii_lowercase())
                        .filter(|q| !q.is_empty())
                        .collect()
                },
                _ => {},
            }
        }

        Some(Self {
            realm: realm?,
            nonce: nonce?,
            opaque,
            qop,
            algorithm,
        })
    }

    /// Build the `Authorization` header value answering this challenge
    pub fn authorization(&self, req: &DigestRequest<'_>) -> Result<String> {
        let session = match self.algorithm.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("MD5") => false,
            Some("MD5-SESS") => true,
            Some(other) => {
                return Err(SyncError::transport(format!(
                    "unsupported digest algorithm '{}'",
                    other
                )))
            },
        };

        let use_qop = if self.qop.is_empty() {
            false
        } else if self.qop.iter().any(|q| q == "auth") {
            true
        } else {
            return Err(SyncError::transport(format!(
                "unsupported digest qop '{}'",
                self.qop.join(",")
            )));
        };

        let mut ha1 = md5_hex(&format!("{}:{}:{}", req.username, self.realm, req.password));
        if session {
            ha1 = md5_hex(&format!("{}:{}:{}", ha1, self.nonce, req.cnonce));
        }
        let ha2 = md5_hex(&format!("{}:{}", req.method, req.uri));
        let nc = format!("{:08x}", req.nc);

        let response = if use_qop {
            md5_hex(&format!(
                "{}:{}:{}:{}:auth:{}",
                ha1, self.nonce, nc, req.cnonce, ha2
            ))
        } else {
            md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2))
        };

        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
            req.username, self.realm, self.nonce, req.uri, response
        );
        if let Some(algorithm) = &self.algorithm {
            header.push_str(&format!(", algorithm={}", algorithm));
        }
        if use_qop {
            header.push_str(&format!(r#", qop=auth, nc={}, cnonce="{}""#, nc, req.cnonce));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }

        Ok(header)
    }
}
