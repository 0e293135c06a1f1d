//! Translation between source and destination path namespaces
//!
//! Paths are handled as `/`-separated strings on both sides so that local
//! and remote locations share one set of rules.

/// Path separator used on both sides of a sync
pub const SEPARATOR: char = '/';

/// Resolved roots for a single sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoots {
    source: String,
    destination: String,
    strip_prefix: String,
}

impl SyncRoots {
    /// Resolve the walk root and the effective destination root.
    ///
    /// When exactly one of `source` and `destination` ends with a separator,
    /// the source directory itself is copied into the destination
    /// (`destination/basename(source)`); otherwise only its contents are.
    pub fn resolve(source: &str, destination: &str) -> Self {
        let stripped = source.trim_end_matches(SEPARATOR);

        let mut effective = destination.to_string();
        if source.ends_with(SEPARATOR) != destination.ends_with(SEPARATOR) {
            let name = basename(stripped);
            if !name.is_empty() {
                effective = join(&effective, name);
            }
        }

        let strip_prefix = format!("{}{}", stripped, SEPARATOR);
        let source = if stripped.is_empty() {
            SEPARATOR.to_string()
        } else {
            stripped.to_string()
        };

        Self {
            source,
            destination: effective,
            strip_prefix,
        }
    }

    /// Root of the source walk
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Effective destination root
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Strip the source root prefix from an absolute source path.
    ///
    /// Paths outside the source root are returned unchanged.
    pub fn relative<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.strip_prefix.as_str()).unwrap_or(path)
    }

    /// Destination path corresponding to an absolute source path
    pub fn destination_for(&self, source_path: &str) -> String {
        join(&self.destination, self.relative(source_path))
    }
}

/// Join a name onto a base path without doubling the separator
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with(SEPARATOR) {
        format!("{}{}", base, name)
    } else {
        format!("{}{}{}", base, SEPARATOR, name)
    }
}

/// Final component of a path (empty for the root or an empty path)
pub fn basename(path: &str) -> &str {
    match path.rsplit_once(SEPARATOR) {
        Some((_, name)) => name,
        None => path,
    }
}

/// Parent of a path; `/` for top-level absolute paths, empty for bare names
pub fn parent(path: &str) -> &str {
    match path.rsplit_once(SEPARATOR) {
        Some(("", _)) => "/",
        Some((head, _)) => head,
        None => "",
    }
}

/// Every directory from the top of `path` down to `path` itself, excluding
/// the filesystem root.
///
/// `"/srv/data/photos"` yields `["/srv", "/srv/data", "/srv/data/photos"]`.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = path;
    if current.len() > 1 {
        current = current.trim_end_matches(SEPARATOR);
    }
    while !current.is_empty() && current != "/" {
        chain.push(current.to_string());
        current = parent(current);
    }
    chain.reverse();
    chain
}
