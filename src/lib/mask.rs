//! Partial hiding of contact addresses before they are published
//!
//! Two styles exist. `KeepDomain` hides the tail of the local part and
//! keeps `@domain` readable, `LocalOnly` is the older format that hides a
//! smaller share of the local part but drops the domain entirely.

use std::fmt;

/// Rounding slack so that `10 * 0.3` counts as exactly `3`
const RATIO_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskStyle {
    /// keep `ceil(len * ratio)` chars of the local part, then `@domain`
    KeepDomain { ratio: f64 },
    /// keep `floor(len * ratio)` chars of the local part, no domain
    LocalOnly { ratio: f64 },
}

impl MaskStyle {
    pub const KEEP_DOMAIN_RATIO: f64 = 0.3;
    pub const LOCAL_ONLY_RATIO: f64 = 0.6;

    pub fn keep_domain() -> Self {
        MaskStyle::KeepDomain {
            ratio: Self::KEEP_DOMAIN_RATIO,
        }
    }

    pub fn local_only() -> Self {
        MaskStyle::LocalOnly {
            ratio: Self::LOCAL_ONLY_RATIO,
        }
    }

    /// Style from its configuration name, with an optional ratio override
    pub fn from_name(name: &str, ratio: Option<f64>) -> Option<Self> {
        let mut style = match name {
            "keep-domain" => Self::keep_domain(),
            "local-only" => Self::local_only(),
            _ => return None,
        };
        if let Some(r) = ratio {
            match &mut style {
                MaskStyle::KeepDomain { ratio } | MaskStyle::LocalOnly { ratio } => *ratio = r,
            }
        }
        Some(style)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MaskStyle::KeepDomain { .. } => "keep-domain",
            MaskStyle::LocalOnly { .. } => "local-only",
        }
    }

    pub fn ratio(&self) -> f64 {
        match *self {
            MaskStyle::KeepDomain { ratio } | MaskStyle::LocalOnly { ratio } => ratio,
        }
    }

    /// Number of leading characters left readable in a local part of `len` chars
    fn kept(&self, len: usize) -> usize {
        let exact = len as f64 * self.ratio();
        let kept = match self {
            MaskStyle::KeepDomain { .. } => (exact - RATIO_SLACK).ceil(),
            MaskStyle::LocalOnly { .. } => (exact + RATIO_SLACK).floor(),
        };
        (kept.max(0.0) as usize).min(len)
    }

    /// Mask `contact`, split on its first `@`
    ///
    /// A contact without `@` is treated as a bare local part.
    /// The empty contact stays empty.
    pub fn mask(&self, contact: &str) -> String {
        let (local, domain) = match contact.find('@') {
            Some(at) => contact.split_at(at),
            None => (contact, ""),
        };
        let len = local.chars().count();
        let kept = self.kept(len);
        let mut masked: String = local.chars().take(kept).collect();
        masked.extend(std::iter::repeat('*').take(len - kept));
        if let MaskStyle::KeepDomain { .. } = self {
            masked.push_str(domain);
        }
        masked
    }
}

impl Default for MaskStyle {
    fn default() -> Self {
        Self::keep_domain()
    }
}

impl fmt::Display for MaskStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.ratio())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! masks {
        ( $style:expr, $in:expr => $out:expr ) => {
            assert_eq!($style.mask($in), $out);
        };
    }

    #[test]
    fn keep_domain() {
        let s = MaskStyle::keep_domain();
        masks!(s, "abc@example.com" => "a**@example.com");
        masks!(s, "abcdefghij@gmail.com" => "abc*******@gmail.com");
        masks!(s, "a@b.c" => "a@b.c");
        masks!(s, "ab@b.c" => "a*@b.c");
        masks!(s, "" => "");
    }

    #[test]
    fn keep_domain_shape() {
        let s = MaskStyle::keep_domain();
        let out = s.mask("olena.petrenko@example.com");
        assert!(out.ends_with("@example.com"));
        let local = out.trim_end_matches("@example.com");
        assert_eq!(local.chars().count(), "olena.petrenko".len());
        assert_eq!(&local[..5], "olena");
        assert!(local[5..].chars().all(|c| c == '*'));
    }

    #[test]
    fn local_only() {
        let s = MaskStyle::local_only();
        masks!(s, "abcdefghij@gmail.com" => "abcdef****");
        masks!(s, "abc@x.org" => "a**");
        masks!(s, "abcde" => "abc**");
        masks!(s, "" => "");
    }

    #[test]
    fn counts_chars_not_bytes() {
        let s = MaskStyle::keep_domain();
        masks!(s, "олена@ukr.net" => "ол***@ukr.net");
    }

    #[test]
    fn only_first_at_splits() {
        let s = MaskStyle::keep_domain();
        masks!(s, "abc@def@ghi" => "a**@def@ghi");
    }

    #[test]
    fn names() {
        assert_eq!(MaskStyle::from_name("keep-domain", None), Some(MaskStyle::keep_domain()));
        assert_eq!(MaskStyle::from_name("local-only", None), Some(MaskStyle::local_only()));
        assert_eq!(
            MaskStyle::from_name("local-only", Some(0.5)),
            Some(MaskStyle::LocalOnly { ratio: 0.5 })
        );
        assert_eq!(MaskStyle::from_name("hide-all", None), None);
    }
}
