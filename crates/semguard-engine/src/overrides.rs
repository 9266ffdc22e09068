//! Project allow-lists and inline skip directives
//!
//! Findings can be allowed in two ways:
//!
//! - a project allow entry (`allow_<code>: true` or `<code>: {"allowed": true}`)
//!   in `semguard.toml` or `project_config.json`, which covers the whole project
//! - a `// SKIP_CHECK: <code> - <reason>` comment, which covers findings
//!   located in the same file
//!
//! Codes may be written as any alias of a rule code. Allowed findings are
//! kept and marked suppressed.

use regex::Regex;
use semguard_core::config::AliasConfig;
use semguard_core::{AllowEntry, Diagnostic, DiagnosticCode, Location};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Alias groups every installation understands
const DEFAULT_ALIASES: &[&[&str]] = &[
    &["bi_directional_filters", "bi_di_filter", "bi_directional", "bidi"],
    &["auto_date_time", "auto_datetime", "autodate"],
    &["measure_description", "measure_desc", "description"],
    &["unused_measures", "unused_measure", "unused"],
    &["naming_convention", "naming"],
    &["many_to_many", "m2m"],
    &["hardcoded_colors", "hardcoded_color", "colors"],
];

/// Prefix accepted on allow-list keys
const ALLOW_PREFIX: &str = "allow_";

/// Reason recorded when a directive gives none
const NO_REASON: &str = "No reason provided";

/// Maps every alias to its rule code (case-insensitive).
///
/// Groups are merged with a union-find when the index is built, so groups
/// sharing a name collapse into one.
#[derive(Debug, Clone, Default)]
pub struct AliasIndex {
    codes: HashMap<String, DiagnosticCode>,
}

impl AliasIndex {
    /// Index of the default groups plus the rule codes themselves
    pub fn builtin() -> Self {
        Self::from_groups(std::iter::empty::<Vec<String>>())
    }

    /// Default groups extended with configured groups
    pub fn from_config(config: &AliasConfig) -> Self {
        Self::from_groups(config.groups.iter().cloned())
    }

    fn from_groups<G>(extra: impl IntoIterator<Item = G>) -> Self
    where
        G: IntoIterator,
        G::Item: AsRef<str>,
    {
        let mut sets = DisjointSets::default();

        for code in DiagnosticCode::RULES {
            sets.insert(code.as_str());
        }
        for group in DEFAULT_ALIASES {
            sets.union_all(group.iter().copied());
        }
        for group in extra {
            let names: Vec<String> = group.into_iter().map(|n| n.as_ref().to_string()).collect();
            sets.union_all(names.iter().map(String::as_str));
        }

        // Each group maps to the first rule code it contains
        let mut root_codes: HashMap<usize, DiagnosticCode> = HashMap::new();
        for code in DiagnosticCode::RULES {
            if let Some(root) = sets.root_of(code.as_str()) {
                root_codes.entry(root).or_insert(code);
            }
        }

        let names: Vec<String> = sets.index.keys().cloned().collect();
        let codes = names
            .into_iter()
            .filter_map(|name| {
                let root = sets.root_of(&name)?;
                root_codes.get(&root).map(|&code| (name, code))
            })
            .collect();

        Self { codes }
    }

    /// Rule code an alias stands for
    pub fn resolve(&self, name: &str) -> Option<DiagnosticCode> {
        self.codes.get(&normalize(name)).copied()
    }

    /// Whether two names denote the same rule
    pub fn same_rule(&self, a: &str, b: &str) -> bool {
        match (self.resolve(a), self.resolve(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Union-find over alias names
#[derive(Debug, Default)]
struct DisjointSets {
    index: HashMap<String, usize>,
    parent: Vec<usize>,
}

impl DisjointSets {
    fn insert(&mut self, name: &str) -> usize {
        let key = normalize(name);
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.parent.len();
        self.parent.push(i);
        self.index.insert(key, i);
        i
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union_all<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let mut first = None;
        for name in names {
            let i = self.insert(name);
            let root = self.find(i);
            match first {
                None => first = Some(root),
                Some(r) if r != root => self.parent[root] = r,
                Some(_) => {}
            }
        }
    }

    fn root_of(&mut self, name: &str) -> Option<usize> {
        let i = *self.index.get(&normalize(name))?;
        Some(self.find(i))
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// An inline `SKIP_CHECK` comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipDirective {
    /// Code or alias as written
    pub code: String,

    pub reason: String,

    /// Line number (1-indexed)
    pub line: usize,
}

fn directive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)//\s*skip_check\s*:\s*([a-z0-9_]+)\s*(?:-\s*(.*?))?\s*$").expect("valid regex")
    })
}

/// Find `// SKIP_CHECK: <code> - <reason>` comments in a file
pub fn scan_skip_directives(text: &str) -> Vec<SkipDirective> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let captures = directive_pattern().captures(line)?;
            let code = captures.get(1)?.as_str().to_string();
            let reason = captures
                .get(2)
                .map(|m| m.as_str().trim())
                .filter(|r| !r.is_empty())
                .unwrap_or(NO_REASON)
                .to_string();
            Some(SkipDirective {
                code,
                reason,
                line: index + 1,
            })
        })
        .collect()
}

/// Allow-list and directives of one project
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSet {
    /// Allow entries keyed by code or alias, `allow_` prefix removed
    pub allowed: BTreeMap<String, bool>,

    /// Skip directives per file
    pub directives: BTreeMap<String, Vec<SkipDirective>>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add allow entries; later entries win over earlier ones
    pub fn allow_entries(&mut self, entries: &BTreeMap<String, AllowEntry>) {
        for (key, entry) in entries {
            let key = normalize(key);
            let key = key.strip_prefix(ALLOW_PREFIX).unwrap_or(&key).to_string();
            self.allowed.insert(key, entry.is_allowed());
        }
    }

    /// Record the skip directives of one file
    pub fn add_file(&mut self, path: &str, text: &str) {
        let directives = scan_skip_directives(text);
        if !directives.is_empty() {
            self.directives.entry(path.to_string()).or_default().extend(directives);
        }
    }

    /// Allow entry granting a code, if any
    fn allowing_entry(&self, code: DiagnosticCode, aliases: &AliasIndex) -> Option<&str> {
        self.allowed
            .iter()
            .find(|(key, allowed)| **allowed && aliases.resolve(key) == Some(code))
            .map(|(key, _)| key.as_str())
    }

    fn directive_for(&self, file: &str, code: DiagnosticCode, aliases: &AliasIndex) -> Option<&SkipDirective> {
        self.directives
            .get(file)?
            .iter()
            .find(|d| aliases.resolve(&d.code) == Some(code))
    }

    /// Warnings for entries and directives naming no known rule
    pub fn validate(&self, aliases: &AliasIndex) -> Vec<Diagnostic> {
        let unknown_entries = self
            .allowed
            .keys()
            .filter(|key| aliases.resolve(key).is_none())
            .map(|key| {
                Diagnostic::for_code(
                    DiagnosticCode::OverrideUnknownRule,
                    format!("Allow entry '{}' does not name a known rule", key),
                )
                .with_object(key.clone())
            });

        let unknown_directives = self.directives.iter().flat_map(|(file, directives)| {
            directives
                .iter()
                .filter(|d| aliases.resolve(&d.code).is_none())
                .map(move |d| {
                    Diagnostic::for_code(
                        DiagnosticCode::OverrideUnknownRule,
                        format!("SKIP_CHECK names unknown rule '{}'", d.code),
                    )
                    .with_location(Location::with_line(file.clone(), d.line))
                    .with_object(d.code.clone())
                })
        });

        unknown_entries.chain(unknown_directives).collect()
    }
}

/// Mark diagnostics allowed by the project or by a directive in their file.
///
/// Only rule findings can be allowed. Suppressed diagnostics stay in the list.
pub fn resolve(diagnostics: &mut [Diagnostic], overrides: &OverrideSet, aliases: &AliasIndex) {
    for diagnostic in diagnostics.iter_mut().filter(|d| d.code.is_rule() && !d.suppressed) {
        let reason = if let Some(key) = overrides.allowing_entry(diagnostic.code, aliases) {
            format!("Allowed by project override '{}{}'", ALLOW_PREFIX, key)
        } else if let Some(directive) = diagnostic
            .file()
            .and_then(|file| overrides.directive_for(file, diagnostic.code, aliases))
        {
            format!("SKIP_CHECK: {}", directive.reason)
        } else {
            continue;
        };

        tracing::debug!(code = %diagnostic.code, reason = %reason, "Suppressed finding");
        diagnostic.suppress(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use semguard_core::Severity;

    #[test]
    fn aliases_resolve_case_insensitively() {
        let aliases = AliasIndex::builtin();
        assert_eq!(aliases.resolve("BIDI"), Some(DiagnosticCode::BiDirectionalFilters));
        assert_eq!(aliases.resolve("bi_di_filter"), Some(DiagnosticCode::BiDirectionalFilters));
        assert_eq!(aliases.resolve("m2m"), Some(DiagnosticCode::ManyToMany));
        assert_eq!(aliases.resolve("date_table_mode"), Some(DiagnosticCode::DateTableMode));
        assert_eq!(aliases.resolve("Colors"), Some(DiagnosticCode::HardcodedColors));
        assert_eq!(aliases.resolve("hardcoded_color"), Some(DiagnosticCode::HardcodedColors));
        assert_eq!(aliases.resolve("colours"), None);
        assert!(aliases.same_rule("unused", "Unused_Measure"));
        assert!(!aliases.same_rule("unused", "naming"));
    }

    #[test]
    fn configured_groups_extend_defaults() {
        let config = AliasConfig {
            groups: vec![
                vec!["date_table_mode".to_string(), "datemode".to_string()],
                vec!["bidi".to_string(), "two_way".to_string()],
            ],
        };
        let aliases = AliasIndex::from_config(&config);

        assert_eq!(aliases.resolve("DateMode"), Some(DiagnosticCode::DateTableMode));
        assert_eq!(aliases.resolve("two_way"), Some(DiagnosticCode::BiDirectionalFilters));
    }

    #[test]
    fn directives_are_scanned() {
        let text = "table T\n// SKIP_CHECK: bidi - approved by finance\n\t// skip_check:unused\n// SKIP_CHECK: m2m -   \n";
        assert_eq!(
            scan_skip_directives(text),
            vec![
                SkipDirective { code: "bidi".to_string(), reason: "approved by finance".to_string(), line: 2 },
                SkipDirective { code: "unused".to_string(), reason: NO_REASON.to_string(), line: 3 },
                SkipDirective { code: "m2m".to_string(), reason: NO_REASON.to_string(), line: 4 },
            ]
        );
    }

    #[test]
    fn allow_prefix_is_stripped() {
        let mut entries = BTreeMap::new();
        entries.insert("allow_Bi_Directional_Filters".to_string(), AllowEntry::Flag(true));
        entries.insert("many_to_many".to_string(), AllowEntry::Table { allowed: false });

        let mut overrides = OverrideSet::new();
        overrides.allow_entries(&entries);

        assert_eq!(overrides.allowed.get("bi_directional_filters"), Some(&true));
        assert_eq!(overrides.allowed.get("many_to_many"), Some(&false));
    }

    #[test]
    fn project_allow_suppresses_and_keeps() {
        let mut entries = BTreeMap::new();
        entries.insert("allow_bidi".to_string(), AllowEntry::Flag(true));
        let mut overrides = OverrideSet::new();
        overrides.allow_entries(&entries);

        let mut diagnostics = vec![
            Diagnostic::for_code(DiagnosticCode::BiDirectionalFilters, "bidi"),
            Diagnostic::for_code(DiagnosticCode::ManyToMany, "m2m"),
        ];
        resolve(&mut diagnostics, &overrides, &AliasIndex::builtin());

        assert!(diagnostics[0].suppressed);
        assert_eq!(
            diagnostics[0].suppression_reason.as_deref(),
            Some("Allowed by project override 'allow_bidi'")
        );
        assert!(!diagnostics[1].suppressed);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn directive_applies_only_to_its_file() {
        let mut overrides = OverrideSet::new();
        overrides.add_file("relationships.tmdl", "// SKIP_CHECK: bidi - approved\n");

        let mut diagnostics = vec![
            Diagnostic::for_code(DiagnosticCode::BiDirectionalFilters, "a")
                .with_location(Location::with_line("relationships.tmdl", 4)),
            Diagnostic::for_code(DiagnosticCode::BiDirectionalFilters, "b")
                .with_location(Location::with_line("other.tmdl", 1)),
            Diagnostic::for_code(DiagnosticCode::ManyToMany, "c")
                .with_location(Location::with_line("relationships.tmdl", 9)),
        ];
        resolve(&mut diagnostics, &overrides, &AliasIndex::builtin());

        let suppressed: Vec<bool> = diagnostics.iter().map(|d| d.suppressed).collect();
        assert_eq!(suppressed, vec![true, false, false]);
        assert_eq!(diagnostics[0].suppression_reason.as_deref(), Some("SKIP_CHECK: approved"));
    }

    #[test]
    fn parse_findings_cannot_be_allowed() {
        let mut overrides = OverrideSet::new();
        overrides.add_file("t.tmdl", "// SKIP_CHECK: parse_malformed_block\n");

        let mut diagnostics = vec![Diagnostic::for_code(DiagnosticCode::ParseMalformedBlock, "bad")
            .with_location(Location::new("t.tmdl"))];
        resolve(&mut diagnostics, &overrides, &AliasIndex::builtin());
        assert!(!diagnostics[0].suppressed);
    }

    #[test]
    fn unknown_codes_are_reported() {
        let mut entries = BTreeMap::new();
        entries.insert("allow_colour_check".to_string(), AllowEntry::Flag(true));
        let mut overrides = OverrideSet::new();
        overrides.allow_entries(&entries);
        overrides.add_file("t.tmdl", "\n// SKIP_CHECK: nonsense - because\n// SKIP_CHECK: naming\n");

        let warnings = overrides.validate(&AliasIndex::builtin());
        let objects: Vec<Option<&str>> = warnings.iter().map(|d| d.object.as_deref()).collect();

        assert_eq!(objects, vec![Some("colour_check"), Some("nonsense")]);
        assert!(warnings.iter().all(|d| d.severity == Severity::Warn));
        assert_eq!(warnings[1].location, Some(Location::with_line("t.tmdl", 2)));
    }
}
