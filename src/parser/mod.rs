//! Text decoding
//!
//! Output types implement [`TextParser`] by binding one [`Rule`] per field
//! through [`Fields`]:
//!
//! ```ignore
//! impl TextParser for QueueState {
//!     fn parse(output: &str) -> Result<Self> {
//!         let f = Fields::new::<Self>(output);
//!         Ok(Self {
//!             ring_size: f.required("ring_size", find_int(r"Number of RXDs: (\d+)"))?,
//!             started: f.required("started", flag("queue state: started"))?,
//!             burst_mode: f.optional("burst_mode", text(r"Burst mode: ([^\r\n]+)"))?,
//!             retries: 3,
//!         })
//!     }
//! }
//! ```
//!
//! A field with no rule takes its value from the constructor expression, so
//! a field lacking both rule and default cannot be written.

pub mod rules;

pub use rules::{
    find, find_int, find_int_radix, flag, groups, named, parse_int, text, Extracted, Find,
    FindInt, Rule,
};

use crate::common::{Error, Result};

/// Construct a value from raw command output
pub trait TextParser: Sized {
    fn parse(text: &str) -> Result<Self>;
}

/// Field binder for one decode of one type
#[derive(Debug, Clone, Copy)]
pub struct Fields<'t> {
    text: &'t str,
    type_name: &'static str,
}

impl<'t> Fields<'t> {
    /// Bind `text` for decoding a `T`; errors name `T`
    pub fn new<T>(text: &'t str) -> Self {
        let full = std::any::type_name::<T>();
        let type_name = full.rsplit("::").next().unwrap_or(full);
        Self { text, type_name }
    }

    pub fn text(&self) -> &'t str {
        self.text
    }

    fn run<R: Rule>(&self, field: &'static str, rule: R) -> Result<Option<R::Output>> {
        rule.extract(self.text).map_err(|e| match e {
            Error::Conversion(reason) => Error::field_conversion(self.type_name, field, &reason),
            other => other,
        })
    }

    /// Value of a field with no default
    pub fn required<R: Rule>(&self, field: &'static str, rule: R) -> Result<R::Output> {
        self.run(field, rule)?
            .ok_or_else(|| Error::missing_field(self.type_name, field))
    }

    /// Value of a field, or `default` when the rule finds nothing
    pub fn or<R: Rule>(&self, field: &'static str, rule: R, default: R::Output) -> Result<R::Output> {
        Ok(self.run(field, rule)?.unwrap_or(default))
    }

    /// Value of a field, or the factory's result when the rule finds nothing
    pub fn or_else<R, F>(&self, field: &'static str, rule: R, factory: F) -> Result<R::Output>
    where
        R: Rule,
        F: FnOnce() -> R::Output,
    {
        Ok(self.run(field, rule)?.unwrap_or_else(factory))
    }

    pub fn or_default<R>(&self, field: &'static str, rule: R) -> Result<R::Output>
    where
        R: Rule,
        R::Output: Default,
    {
        Ok(self.run(field, rule)?.unwrap_or_default())
    }

    /// Value of a field whose absence is meaningful
    pub fn optional<R: Rule>(&self, field: &'static str, rule: R) -> Result<Option<R::Output>> {
        self.run(field, rule)
    }
}

/// Split output into blocks, each starting at a line that matches `header`
///
/// Text before the first header is dropped.
pub fn split_blocks<'t>(text: &'t str, header: &str) -> Result<Vec<&'t str>> {
    let re = regex::RegexBuilder::new(header)
        .multi_line(true)
        .build()
        .map_err(|e| Error::invalid_pattern(header, e))?;

    let starts: Vec<usize> = re.find_iter(text).map(|m| m.start()).collect();
    Ok(starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            &text[start..end]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorKind;

    #[derive(Debug)]
    struct LinkInfo {
        up: bool,
        speed: String,
        mtu: u64,
        mac_count: u64,
        driver: Option<String>,
        tags: Vec<String>,
        retries: u32,
    }

    impl TextParser for LinkInfo {
        fn parse(text: &str) -> Result<Self> {
            let f = Fields::new::<Self>(text);
            Ok(Self {
                up: f.required("up", flag("Link status: up"))?,
                speed: f.required("speed", rules::text(r"Link speed: ([^\n]+)"))?,
                mtu: f.or("mtu", find_int(r"MTU: (\d+)"), 1500)?,
                mac_count: f.or_default("mac_count", find_int(r"MAC addresses: (\d+)"))?,
                driver: f.optional("driver", rules::text(r"Driver name: (\S+)"))?,
                tags: f.or_else(
                    "tags",
                    rules::text(r"Tags: ([^\n]+)")
                        .map(|s| s.split(',').map(str::to_string).collect()),
                    || vec!["none".to_string()],
                )?,
                retries: 3,
            })
        }
    }

    #[test]
    fn test_defaults_fill_absent_fields() {
        let info = LinkInfo::parse("Link status: down\nLink speed: 25 Gbps\n").unwrap();
        assert!(!info.up);
        assert_eq!(info.speed, "25 Gbps");
        assert_eq!(info.mtu, 1500);
        assert_eq!(info.mac_count, 0);
        assert_eq!(info.driver, None);
        assert_eq!(info.tags, vec!["none"]);
        assert_eq!(info.retries, 3);
    }

    #[test]
    fn test_present_values_win_over_defaults() {
        let info = LinkInfo::parse(
            "Link status: up\nLink speed: 10 Gbps\nMTU: 9000\nDriver name: net_ice\nTags: a,b\n",
        )
        .unwrap();
        assert!(info.up);
        assert_eq!(info.mtu, 9000);
        assert_eq!(info.driver.as_deref(), Some("net_ice"));
        assert_eq!(info.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_required_field_names_type_and_field() {
        let err = LinkInfo::parse("Link status: up\n").unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField {
                type_name: "LinkInfo",
                field: "speed"
            }
        ));
        assert_eq!(err.kind(), ErrorKind::DecodeMiss);
    }

    #[test]
    fn test_conversion_error_names_field() {
        let f = Fields::new::<LinkInfo>("MTU: lots");
        let err = f.required("mtu", find_int(r"MTU: (\w+)")).unwrap_err();
        assert!(matches!(err, Error::FieldConversion { field: "mtu", .. }));
    }

    #[test]
    fn test_split_blocks() {
        let text = "banner\nPort 0:\n  a\nPort 1:\n  b\n";
        let blocks = split_blocks(text, r"^Port \d+:").unwrap();
        assert_eq!(blocks, vec!["Port 0:\n  a\n", "Port 1:\n  b\n"]);
        assert!(split_blocks("nothing", r"^Port").unwrap().is_empty());
    }
}
