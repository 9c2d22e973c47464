//! A line-oriented stand-in for a real schema parser.

use crate::core::SourceError;
use crate::source::{ParsedSource, Revision, SourceDependency, SourceIdentifier, SourceInfo, SourceParser};

/// Parses a tiny header format, one statement per line:
///
/// ```text
/// module app@2020-01-01
/// import types
/// import inet@2013-07-15
/// include app-sub
/// ```
///
/// A submodule starts with `submodule <name>` and declares `belongs-to <module>`.
/// Blank lines and lines starting with `//` are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockParser;

fn split_reference(text: &str) -> Result<(&str, Option<Revision>), String> {
    match text.split_once('@') {
        Some((name, revision)) => {
            let revision = Revision::parse(revision).map_err(|e| e.to_string())?;
            Ok((name, Some(revision)))
        }
        None => Ok((text, None)),
    }
}

fn dependency(text: &str) -> Result<SourceDependency, String> {
    let (name, revision) = split_reference(text)?;
    Ok(match revision {
        Some(revision) => SourceDependency::with_revision(name, revision),
        None => SourceDependency::new(name),
    })
}

impl MockParser {
    fn parse_info(text: &str) -> Result<SourceInfo, String> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//"));

        let header = lines.next().ok_or("empty source")?;
        let (is_submodule, declared) = match header.split_once(' ') {
            Some(("module", rest)) => (false, rest.trim()),
            Some(("submodule", rest)) => (true, rest.trim()),
            _ => return Err(format!("expected module or submodule header, found '{header}'")),
        };
        let (name, revision) = split_reference(declared)?;
        let mut info = SourceInfo::module(SourceIdentifier::from_parts(name, revision));

        for line in lines {
            let Some((keyword, target)) = line.split_once(' ') else {
                return Err(format!("malformed statement '{line}'"));
            };
            let target = dependency(target.trim())?;
            match keyword {
                "import" => info.imports.insert(target),
                "include" => info.includes.insert(target),
                "belongs-to" if is_submodule => {
                    info.belongs_to = Some(target);
                    true
                }
                _ => return Err(format!("unexpected statement '{line}'")),
            };
        }

        if is_submodule && info.belongs_to.is_none() {
            return Err("submodule without belongs-to".to_string());
        }
        Ok(info)
    }
}

impl SourceParser for MockParser {
    fn parse(&self, requested: &SourceIdentifier, text: &str) -> Result<ParsedSource, SourceError> {
        let info = Self::parse_info(text).map_err(|message| SourceError::Parse {
            id: requested.clone(),
            message,
        })?;
        Ok(ParsedSource::new(info, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_header_and_statements() {
        let parsed = MockParser
            .parse(
                &SourceIdentifier::new("app"),
                "module app@2020-01-01\nimport types\n\n// comment\ninclude app-sub\n",
            )
            .unwrap();

        assert_eq!(parsed.id().to_string(), "app@2020-01-01");
        assert!(parsed.info().imports.contains(&SourceDependency::new("types")));
        assert!(parsed.info().includes.contains(&SourceDependency::new("app-sub")));
        assert!(!parsed.info().is_submodule());
    }

    #[test]
    fn test_parse_submodule() {
        let parsed = MockParser
            .parse(&SourceIdentifier::new("app-sub"), "submodule app-sub\nbelongs-to app")
            .unwrap();
        assert_eq!(parsed.info().belongs_to, Some(SourceDependency::new("app")));
    }

    #[test]
    fn test_parse_errors_carry_requested_identifier() {
        for text in ["", "container x", "module a\nbelongs-to b", "submodule s", "module a@never"] {
            let err = MockParser.parse(&SourceIdentifier::new("req"), text).unwrap_err();
            assert_eq!(err.source_id(), &SourceIdentifier::new("req"), "for {text:?}");
        }
    }
}
