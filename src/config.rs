use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path as FsPath, PathBuf};

use crate::error::Error;
use crate::path::{AbsolutePath, Path, PathResolution, is_external_url};

/// File name of a per-directory configuration layer.
pub const DIRECTORY_CONFIG: &str = "directory.toml";

/// Effective configuration of a document or tree: its own layer merged over
/// every ancestor layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Promote the first header of a document to its title.
    pub first_header_as_title: bool,
    /// Named link targets usable from every document in scope.
    pub global_targets: BTreeMap<String, GlobalTarget>,
    /// Internal subtrees published under an external base URL.
    pub link_mappings: Vec<LinkMapping>,
    /// Output formats the document may be rendered to.
    pub target_formats: TargetFormats,
}

/// Destination of a configured global link target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalTarget {
    /// External URL.
    External(String),
    /// Absolute virtual path, resolved against the declaring directory.
    Internal(AbsolutePath),
}

/// An internal subtree that is published under an external base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMapping {
    /// Base URL the subtree is published under.
    pub external_url: String,
    /// Root of the mapped subtree.
    pub internal_path: AbsolutePath,
}

/// Set of enabled output formats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetFormats {
    /// Every output format.
    #[default]
    All,
    /// Only the named formats.
    Only(BTreeSet<String>),
}

impl TargetFormats {
    /// Whether every format enabled in `self` is also enabled in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        return match (self, other) {
            (_, TargetFormats::All) => true,
            (TargetFormats::All, TargetFormats::Only(_)) => false,
            (TargetFormats::Only(mine), TargetFormats::Only(theirs)) => mine.is_subset(theirs),
        };
    }

    /// Human-readable list, e.g. `[html, pdf]`.
    pub fn describe(&self) -> String {
        return match self {
            TargetFormats::All => "all formats".to_string(),
            TargetFormats::Only(formats) => {
                let names: Vec<&str> = formats.iter().map(String::as_str).collect();
                format!("[{}]", names.join(", "))
            },
        };
    }
}

impl Config {
    /// Longest configured mapping whose subtree contains `path`.
    pub fn mapping_for(&self, path: &AbsolutePath) -> Option<&LinkMapping> {
        return self
            .link_mappings
            .iter()
            .filter(|m| return path.is_within(&m.internal_path))
            .max_by_key(|m| return m.internal_path.depth());
    }
}

/// One configuration layer as written in `directory.toml` or front matter.
/// Unset keys inherit from the parent layer.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    /// Promote the first header of a document to its title.
    first_header_as_title: Option<bool>,
    /// Link settings.
    #[serde(default)]
    links: LinksLayer,
    /// Enabled output formats; absent means inherit.
    target_formats: Option<Vec<String>>,
}

/// `[links]` table of a layer.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct LinksLayer {
    /// `[[links.mappings]]` entries.
    #[serde(default)]
    mappings: Vec<RawMapping>,
    /// `[links.targets]` name → URL or path.
    #[serde(default)]
    targets: BTreeMap<String, String>,
}

/// Raw `[[links.mappings]]` entry.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMapping {
    /// Base URL the subtree is published under.
    external_url: String,
    /// Subtree path, absolute or relative to the declaring directory.
    internal_path: String,
}

impl ConfigLayer {
    /// Load the layer from `directory.toml` in `dir`.
    /// Returns an empty layer if the file doesn't exist.
    /// A file that exists but is malformed is an error, not an empty layer.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(dir: &FsPath) -> Result<Self, Error> {
        let path = dir.join(DIRECTORY_CONFIG);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
        };
        return Self::parse(&content, &path);
    }

    /// Parse a layer from TOML text read from `origin`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or has unknown keys.
    pub fn parse(content: &str, origin: &FsPath) -> Result<Self, Error> {
        return toml::from_str(content).map_err(|source| {
            return Error::TomlDe {
                path: origin.to_path_buf(),
                source,
            };
        });
    }

    /// Merge this layer over `parent`. Relative paths in the layer are
    /// resolved against `base`, the tree path of the declaring directory.
    ///
    /// Scalars override, target tables merge by key, and mapping lists
    /// concatenate with this layer's entries first.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` for a path that ascends above the root.
    pub fn apply(&self, parent: &Config, base: &AbsolutePath, origin: &FsPath) -> Result<Config, Error> {
        let mut global_targets = parent.global_targets.clone();
        for (name, raw) in &self.links.targets {
            let target = if is_external_url(raw) {
                GlobalTarget::External(raw.clone())
            } else {
                GlobalTarget::Internal(resolve_config_path(raw, base, origin)?)
            };
            global_targets.insert(name.clone(), target);
        }

        let mut link_mappings = Vec::with_capacity(
            self.links.mappings.len().saturating_add(parent.link_mappings.len()),
        );
        for raw in &self.links.mappings {
            link_mappings.push(LinkMapping {
                external_url: raw.external_url.clone(),
                internal_path: resolve_config_path(&raw.internal_path, base, origin)?,
            });
        }
        link_mappings.extend(parent.link_mappings.iter().cloned());

        let target_formats = match &self.target_formats {
            Some(names) => TargetFormats::Only(names.iter().cloned().collect()),
            None => parent.target_formats.clone(),
        };

        return Ok(Config {
            first_header_as_title: self
                .first_header_as_title
                .unwrap_or(parent.first_header_as_title),
            global_targets,
            link_mappings,
            target_formats,
        });
    }
}

/// Resolve a path written in a configuration layer to an absolute path.
///
/// # Errors
///
/// Returns `Error::ConfigInvalid` if the path ascends above the virtual root.
fn resolve_config_path(raw: &str, base: &AbsolutePath, origin: &FsPath) -> Result<AbsolutePath, Error> {
    let invalid = |reason: String| {
        return Error::ConfigInvalid {
            path: PathBuf::from(origin),
            reason,
        };
    };
    return match Path::parse(raw) {
        Ok(Path::Absolute(path)) => Ok(path),
        Ok(Path::Relative(relative)) => match base.resolve(&relative) {
            PathResolution::Internal(path) => Ok(path),
            PathResolution::EscapesRoot(_) => {
                Err(invalid(format!("`{raw}` ascends above the virtual root")))
            },
        },
        Err(e) => Err(invalid(e.to_string())),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(toml: &str) -> ConfigLayer {
        return ConfigLayer::parse(toml, FsPath::new("directory.toml")).unwrap();
    }

    fn abs(raw: &str) -> AbsolutePath {
        return AbsolutePath::parse(raw).unwrap();
    }

    #[test]
    fn empty_layer_inherits_everything() {
        let parent = Config {
            first_header_as_title: true,
            ..Config::default()
        };
        let merged = layer("").apply(&parent, &AbsolutePath::root(), FsPath::new("x")).unwrap();
        assert_eq!(merged, parent);
    }

    #[test]
    fn resolves_relative_targets_against_declaring_directory() {
        let merged = layer(
            r#"
            [links.targets]
            rust = "https://www.rust-lang.org"
            intro = "../guide/intro.md#start"
            "#,
        )
        .apply(&Config::default(), &abs("/tree1"), FsPath::new("x"))
        .unwrap();

        assert_eq!(
            merged.global_targets.get("rust"),
            Some(&GlobalTarget::External("https://www.rust-lang.org".to_string()))
        );
        assert_eq!(
            merged.global_targets.get("intro"),
            Some(&GlobalTarget::Internal(abs("/guide/intro.md#start")))
        );
    }

    #[test]
    fn child_formats_override_parent() {
        let parent = layer(r#"target_formats = ["html", "pdf"]"#)
            .apply(&Config::default(), &AbsolutePath::root(), FsPath::new("x"))
            .unwrap();
        let child = layer(r#"target_formats = ["pdf"]"#)
            .apply(&parent, &abs("/sub"), FsPath::new("x"))
            .unwrap();
        assert_eq!(child.target_formats.describe(), "[pdf]");
        assert!(child.target_formats.is_subset_of(&parent.target_formats));
        assert!(!parent.target_formats.is_subset_of(&child.target_formats));
    }

    #[test]
    fn all_formats_is_not_subset_of_restricted() {
        let restricted = TargetFormats::Only(BTreeSet::from(["pdf".to_string()]));
        assert!(!TargetFormats::All.is_subset_of(&restricted));
        assert!(restricted.is_subset_of(&TargetFormats::All));
    }

    #[test]
    fn longest_mapping_wins() {
        let config = layer(
            r#"
            [[links.mappings]]
            internal_path = "/tree2"
            external_url = "http://external/"

            [[links.mappings]]
            internal_path = "/tree2/api"
            external_url = "http://api.external/"
            "#,
        )
        .apply(&Config::default(), &AbsolutePath::root(), FsPath::new("x"))
        .unwrap();

        let mapping = config.mapping_for(&abs("/tree2/api/types.md")).unwrap();
        assert_eq!(mapping.external_url, "http://api.external/");
        assert!(config.mapping_for(&abs("/tree1/doc.md")).is_none());
    }

    #[test]
    fn escaping_mapping_path_is_rejected() {
        let result = layer(
            r#"
            [[links.mappings]]
            internal_path = "../../x"
            external_url = "http://external/"
            "#,
        )
        .apply(&Config::default(), &abs("/tree1"), FsPath::new("x"));
        assert!(matches!(result, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn unknown_keys_are_errors() {
        let result = ConfigLayer::parse("first_header_as_titel = true", FsPath::new("x"));
        assert!(matches!(result, Err(Error::TomlDe { .. })));
    }
}
