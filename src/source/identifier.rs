//! Identities of schema sources and the references between them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::constants::{REVISION_FORMAT, REVISION_SEPARATOR, SOURCE_FILE_EXTENSION, targets};
use crate::core::InvalidRevision;

/// A module revision date (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(NaiveDate);

impl Revision {
    /// Parse a `YYYY-MM-DD` revision.
    pub fn parse(value: &str) -> Result<Self, InvalidRevision> {
        NaiveDate::parse_from_str(value, REVISION_FORMAT).map(Self).map_err(|_| InvalidRevision {
            value: value.to_string(),
        })
    }

    /// The underlying calendar date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for Revision {
    type Err = InvalidRevision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Revision {
    type Error = InvalidRevision;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Revision> for String {
    fn from(revision: Revision) -> Self {
        revision.to_string()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(REVISION_FORMAT))
    }
}

/// Identity of one module or submodule source: a name plus an optional revision.
///
/// Ordering is by name, then revision, with the revision-less identifier sorting
/// first. Resolution relies on that to find every revision of a name with one
/// range scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceIdentifier {
    name: Arc<str>,
    revision: Option<Revision>,
}

impl SourceIdentifier {
    /// Identifier without a revision.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            revision: None,
        }
    }

    /// Identifier with a revision.
    pub fn with_revision(name: impl AsRef<str>, revision: Revision) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            revision: Some(revision),
        }
    }

    /// Identifier with an optional revision.
    pub fn from_parts(name: impl AsRef<str>, revision: Option<Revision>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            revision,
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Revision, if one is known.
    pub fn revision(&self) -> Option<Revision> {
        self.revision
    }

    /// The lowest identifier carrying `name`; start of a range scan over its revisions.
    pub(crate) fn lower_bound(name: &str) -> Self {
        Self::new(name)
    }

    /// Canonical file name, `name@revision.yang` or `name.yang`.
    pub fn to_file_name(&self) -> String {
        format!("{self}{SOURCE_FILE_EXTENSION}")
    }

    /// Guess an identifier from a file name such as `ietf-inet-types@2010-09-24.yang`.
    ///
    /// The extension is optional. A revision that does not parse is logged and
    /// the whole stem becomes the name, so registration can still proceed and the
    /// parsed content decides the real identity.
    pub fn from_file_name(file_name: &str) -> Self {
        let stem = file_name.strip_suffix(SOURCE_FILE_EXTENSION).unwrap_or(file_name);
        match stem.split_once(REVISION_SEPARATOR) {
            Some((name, revision)) => match Revision::parse(revision) {
                Ok(revision) => Self::with_revision(name, revision),
                Err(e) => {
                    tracing::warn!(
                        target: targets::SOURCE,
                        "Invalid file name format in '{}': {}",
                        file_name,
                        e
                    );
                    Self::new(stem)
                }
            },
            None => Self::new(stem),
        }
    }
}

impl fmt::Display for SourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.revision {
            Some(revision) => write!(f, "{}{REVISION_SEPARATOR}{revision}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A reference made by one source to another: an import, an include or a belongs-to target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceDependency {
    name: Arc<str>,
    revision: Option<Revision>,
}

impl SourceDependency {
    /// Reference to any revision of `name`.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            revision: None,
        }
    }

    /// Reference to one specific revision of `name`.
    pub fn with_revision(name: impl AsRef<str>, revision: Revision) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            revision: Some(revision),
        }
    }

    /// Referenced module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested revision; `None` accepts any.
    pub fn revision(&self) -> Option<Revision> {
        self.revision
    }

    /// The identifier this reference names, taken literally.
    pub fn to_identifier(&self) -> SourceIdentifier {
        SourceIdentifier::from_parts(&*self.name, self.revision)
    }
}

impl fmt::Display for SourceDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.revision {
            Some(revision) => write!(f, "{}{REVISION_SEPARATOR}{revision}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Declared identity and cross-references of a source, as reported by the parser.
///
/// Submodules carry `belongs_to`; modules do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Declared identity
    pub id: SourceIdentifier,
    /// Imported modules
    pub imports: BTreeSet<SourceDependency>,
    /// Included submodules
    pub includes: BTreeSet<SourceDependency>,
    /// Parent module of a submodule
    pub belongs_to: Option<SourceDependency>,
}

impl SourceInfo {
    /// Info for a module with no dependencies yet.
    pub fn module(id: SourceIdentifier) -> Self {
        Self {
            id,
            imports: BTreeSet::new(),
            includes: BTreeSet::new(),
            belongs_to: None,
        }
    }

    /// Info for a submodule of `parent`.
    pub fn submodule(id: SourceIdentifier, parent: SourceDependency) -> Self {
        Self {
            belongs_to: Some(parent),
            ..Self::module(id)
        }
    }

    /// Add an import.
    #[must_use]
    pub fn with_import(mut self, dependency: SourceDependency) -> Self {
        self.imports.insert(dependency);
        self
    }

    /// Add an include.
    #[must_use]
    pub fn with_include(mut self, dependency: SourceDependency) -> Self {
        self.includes.insert(dependency);
        self
    }

    /// Whether this describes a submodule.
    pub fn is_submodule(&self) -> bool {
        self.belongs_to.is_some()
    }

    /// Imports and includes, in that order.
    pub fn requirements(&self) -> impl Iterator<Item = &SourceDependency> {
        self.imports.iter().chain(self.includes.iter())
    }

    /// Every reference: imports, includes and the belongs-to target.
    pub fn dependencies(&self) -> impl Iterator<Item = &SourceDependency> {
        self.requirements().chain(self.belongs_to.iter())
    }
}

/// A source as produced by the external parser: its dependency info plus the
/// text it was parsed from. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    info: Arc<SourceInfo>,
    text: Arc<str>,
}

impl ParsedSource {
    /// Wrap parser output.
    pub fn new(info: SourceInfo, text: impl Into<Arc<str>>) -> Self {
        Self {
            info: Arc::new(info),
            text: text.into(),
        }
    }

    /// The identifier the content declares.
    pub fn id(&self) -> &SourceIdentifier {
        &self.info.id
    }

    /// Declared dependency info.
    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Raw text.
    pub fn text(&self) -> &str {
        &self.text
    }
}
