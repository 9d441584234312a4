//! Capabilities advertised in the EHLO reply.

/// SASL mechanisms the client can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN (RFC 4616).
    Plain,
    /// LOGIN (legacy, recognised but not used).
    Login,
    /// `XOAUTH2` bearer token.
    XOAuth2,
}

impl AuthMechanism {
    /// Parses a mechanism name; unknown mechanisms yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// Returns the mechanism name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

/// Server extensions from EHLO.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// STARTTLS is offered.
    pub starttls: bool,
    /// Advertised AUTH mechanisms the client knows.
    pub auth: Vec<AuthMechanism>,
    /// SIZE limit; `Some(0)` means no fixed limit.
    pub size: Option<usize>,
    /// 8BITMIME.
    pub eight_bit_mime: bool,
    /// SMTPUTF8.
    pub smtp_utf8: bool,
    /// PIPELINING (recognised, not used).
    pub pipelining: bool,
}

impl Capabilities {
    /// Parses EHLO reply lines; the first line is the server greeting and
    /// is skipped.
    #[must_use]
    pub fn parse(lines: &[String]) -> Self {
        let mut caps = Self::default();
        for line in lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            match keyword.to_ascii_uppercase().as_str() {
                "STARTTLS" => caps.starttls = true,
                // Some servers still use the pre-standard `AUTH=` form.
                "AUTH" => caps.auth.extend(words.filter_map(AuthMechanism::parse)),
                k if k.starts_with("AUTH=") => {
                    caps.auth.extend(
                        std::iter::once(&keyword[5..])
                            .chain(words)
                            .filter_map(AuthMechanism::parse),
                    );
                }
                "SIZE" => caps.size = Some(words.next().and_then(|s| s.parse().ok()).unwrap_or(0)),
                "8BITMIME" => caps.eight_bit_mime = true,
                "SMTPUTF8" => caps.smtp_utf8 = true,
                "PIPELINING" => caps.pipelining = true,
                _ => {}
            }
        }
        caps.auth.dedup();
        caps
    }

    /// Returns true if `mechanism` was advertised.
    #[must_use]
    pub fn supports_auth(&self, mechanism: AuthMechanism) -> bool {
        self.auth.contains(&mechanism)
    }

    /// The advertised size limit, if any.
    #[must_use]
    pub fn size_limit(&self) -> Option<usize> {
        self.size.filter(|&n| n > 0)
    }
}
