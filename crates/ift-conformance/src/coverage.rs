//! Conformance statement coverage.
//!
//! Compares the conformance statements tagged in the specification HTML
//! against the ids a suite run reported as tested.
//!
//! # Format
//!
//! Server conformance statements are tagged as
//! ```html
//! <span id="conform-response-magic-number" class="conform server">...</span>
//! ```
//! and a run reports each exercised id on its own line:
//! ```text
//! tested conformance id: conform-response-magic-number
//! ```

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix of a tested-id line.
pub const TESTED_ID_PREFIX: &str = "tested conformance id: ";

static SPAN_TAG: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?is)<span\b([^>]*)>"));

/// Regions whose contents are not markup.
static UNPARSED: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<!--.*?-->|<!\[CDATA\[.*?\]\]>|<script\b.*?</script\s*>|<style\b.*?</style\s*>",
    )
});

static CHARACTER_REFERENCE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9A-Fa-f]+|[A-Za-z]+);"));

static ATTRIBUTE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
});

fn compiled(regex: &'static LazyLock<Result<Regex, regex::Error>>) -> io::Result<&'static Regex> {
    LazyLock::force(regex)
        .as_ref()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
}

/// Ids of server conformance statements in `html`: every `<span>` with an
/// `id` attribute whose `class` contains both `conform` and `server`.
///
/// # Errors
///
/// Returns an error if the scanner patterns fail to compile.
pub fn spec_conformance_ids(html: &str) -> io::Result<BTreeSet<String>> {
    let span = compiled(&SPAN_TAG)?;
    let attribute = compiled(&ATTRIBUTE)?;
    let reference = compiled(&CHARACTER_REFERENCE)?;
    let markup = compiled(&UNPARSED)?.replace_all(html, "");

    let mut ids = BTreeSet::new();
    for tag in span.captures_iter(&markup) {
        let Some(attrs) = tag.get(1) else { continue };
        let mut id = None;
        let mut class = None;
        for attr in attribute.captures_iter(attrs.as_str()) {
            let name = attr.get(1).map(|m| m.as_str().to_ascii_lowercase());
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map_or("", |m| m.as_str());
            match name.as_deref() {
                Some("id") if id.is_none() => id = Some(unescape(reference, value).into_owned()),
                Some("class") if class.is_none() => {
                    class = Some(unescape(reference, value).into_owned());
                }
                _ => {}
            }
        }
        if let (Some(id), Some(class)) = (id, class) {
            if class.contains("conform") && class.contains("server") {
                ids.insert(id);
            }
        }
    }
    Ok(ids)
}

/// Resolve character references in an attribute value. Unknown named
/// references are kept as written.
fn unescape<'h>(reference: &Regex, value: &'h str) -> Cow<'h, str> {
    reference.replace_all(value, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let hex = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X"));
        let resolved = if let Some(hex) = hex {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(decimal) = name.strip_prefix('#') {
            decimal.parse().ok().and_then(char::from_u32)
        } else {
            match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => None,
            }
        };
        resolved.map_or_else(|| caps[0].to_string(), String::from)
    })
}

/// Ids listed on `tested conformance id: ` lines; other lines are ignored.
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn tested_conformance_ids<R: BufRead>(reader: R) -> io::Result<BTreeSet<String>> {
    let mut ids = BTreeSet::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(id) = line.strip_prefix(TESTED_ID_PREFIX) {
            ids.insert(id.trim_end().to_string());
        }
    }
    Ok(ids)
}

/// Coverage comparison output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Statements found in the specification.
    pub spec_ids: usize,
    /// Distinct ids reported as tested.
    pub tested_ids: usize,
    /// In the specification but never tested.
    pub untested: Vec<String>,
    /// Tested but not in the specification.
    pub unknown: Vec<String>,
}

impl CoverageReport {
    /// Compare the two id sets.
    #[must_use]
    pub fn compare(spec: &BTreeSet<String>, tested: &BTreeSet<String>) -> Self {
        Self {
            spec_ids: spec.len(),
            tested_ids: tested.len(),
            untested: spec.difference(tested).cloned().collect(),
            unknown: tested.difference(spec).cloned().collect(),
        }
    }

    /// Returns true if every statement in the specification was tested.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.untested.is_empty()
    }
}

/// Scan the specification at `spec_path` and the run output at
/// `tested_path`, and compare them.
///
/// # Errors
///
/// Returns an error if either file cannot be read.
pub fn check_files<P: AsRef<Path>, Q: AsRef<Path>>(
    spec_path: P,
    tested_path: Q,
) -> io::Result<CoverageReport> {
    let html = std::fs::read_to_string(spec_path)?;
    let spec = spec_conformance_ids(&html)?;
    let tested = tested_conformance_ids(BufReader::new(std::fs::File::open(tested_path)?))?;
    Ok(CoverageReport::compare(&spec, &tested))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
        <p><span id="conform-response-magic-number" class="conform server">The
        server must ...</span></p>
        <SPAN class='server conform' ID='conform-request-not-found'>...</SPAN>
        <span id="conform-client-only" class="conform client">...</span>
        <span class="conform server">no id</span>
        <span id=conform-unquoted class=conform-server>...</span>
        <spanner id="conform-not-a-span" class="conform server"></spanner>
    "#;

    #[test]
    fn finds_tagged_server_statements() {
        let ids = spec_conformance_ids(SPEC).unwrap();
        let expected: BTreeSet<String> = [
            "conform-response-magic-number",
            "conform-request-not-found",
            "conform-unquoted",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn resolves_references_and_skips_unparsed_regions() {
        let html = r#"
            <span id="conform-a&amp;b" class="conform&#x20;server">...</span>
            <span id="conform-&#99;&lt;d&gt;" class='conform server'>...</span>
            <span id="conform-&bogus;" class="conform server">...</span>
            <!-- <span id="conform-commented" class="conform server"></span> -->
            <script>let s = '<span id="conform-scripted" class="conform server">';</script>
            <style>/* <span id="conform-styled" class="conform server"> */</style>
        "#;
        let ids = spec_conformance_ids(html).unwrap();
        let expected: BTreeSet<String> = ["conform-a&b", "conform-c<d>", "conform-&bogus;"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn reads_prefixed_lines_only() {
        let text = "running\ntested conformance id: conform-a\ntested conformance id: conform-b\r\n\
                    tested conformance id: conform-a\nnoise: conform-c\n";
        let ids = tested_conformance_ids(text.as_bytes()).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("conform-a"));
        assert!(ids.contains("conform-b"));
    }

    #[test]
    fn reports_untested_and_unknown() {
        let spec: BTreeSet<String> = ["a", "b"].into_iter().map(String::from).collect();
        let tested: BTreeSet<String> = ["b", "c"].into_iter().map(String::from).collect();
        let report = CoverageReport::compare(&spec, &tested);
        assert_eq!(report.untested, vec!["a".to_string()]);
        assert_eq!(report.unknown, vec!["c".to_string()]);
        assert!(!report.is_complete());
        assert!(CoverageReport::compare(&spec, &spec).is_complete());
    }
}
