//! Phone number normalization for the ticketing system.
//!
//! The PBX reports external parties in several shapes: a bare number, a
//! number followed by a bracketed display name (`0123456789 (+491234567890)`)
//! or a bracketed name only. The ticketing system wants the national format
//! (`0123...`), so the bracket content wins when present and the configured
//! country prefix is rewritten to a leading `0`.

/// Converts raw party text into the national number format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_prefix: Option<String>,
}

impl PhoneNormalizer {
    /// Create a normalizer. A leading `+` on the prefix is ignored; an empty
    /// prefix means "no country prefix configured".
    pub fn new(country_prefix: Option<&str>) -> Self {
        let country_prefix = country_prefix
            .map(|p| p.trim().trim_start_matches('+'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Self { country_prefix }
    }

    pub fn country_prefix(&self) -> Option<&str> {
        self.country_prefix.as_deref()
    }

    /// Normalize a raw party text.
    ///
    /// Both steps run to a fixed point so that `normalize(normalize(x)) ==
    /// normalize(x)` holds for every input, including nested brackets and
    /// numbers that still carry a prefix after one rewrite.
    pub fn normalize(&self, raw: &str) -> String {
        let number = bracket_content(raw);
        match &self.country_prefix {
            Some(prefix) => strip_country_prefix(number.to_string(), prefix),
            None => number.to_string(),
        }
    }
}

/// Text strictly between the first `(` and the last `)` after it, repeated
/// until no `(` is left. An unclosed bracket runs to the end of the text.
fn bracket_content(text: &str) -> &str {
    let mut current = text;
    while let Some(open) = current.find('(') {
        let inner = &current[open + 1..];
        current = match inner.rfind(')') {
            Some(close) => &inner[..close],
            None => inner,
        };
    }
    current
}

fn strip_country_prefix(mut number: String, prefix: &str) -> String {
    loop {
        let rest = if let Some(rest) = number.strip_prefix('+').and_then(|n| n.strip_prefix(prefix)) {
            rest
        } else if let Some(rest) = number.strip_prefix("00").and_then(|n| n.strip_prefix(prefix)) {
            rest
        } else if let Some(rest) = number.strip_prefix(prefix) {
            rest
        } else {
            return number;
        };

        let rewritten = format!("0{}", rest);
        if rewritten == number {
            return number;
        }
        number = rewritten;
    }
}
