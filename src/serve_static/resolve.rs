use std::fs::{self, Metadata};
use std::path::{Component, Path, PathBuf};

/// How path segments beginning with a dot are treated.
///
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Dotfiles {
    Allow,
    Deny,
    #[default]
    Ignore,
}

pub(crate) struct ResolvedFile {
    pub path: PathBuf,
    pub metadata: Metadata,
    pub mime_type: String,
}

pub(crate) enum Resolution {
    Found(ResolvedFile),

    /// The target is a directory reached without a trailing slash;
    /// redirect to the slashed form.
    Directory,

    NotFound,

    /// A dotfile blocked by policy.
    Denied,

    /// The candidate path escaped the root. The file was never opened.
    Escaped,
}

const UTF_8_PREFERRED_MIME_TYPES: [&str; 3] = [
    "application/javascript",
    "application/json",
    "application/xml",
];

fn mime_type_for(path: &Path) -> String {
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    if mime_type.starts_with("text/") || UTF_8_PREFERRED_MIME_TYPES.contains(&&*mime_type) {
        mime_type + "; charset=utf-8"
    } else {
        mime_type
    }
}

/// Join the request path onto the root lexically, refusing to step above
/// it. Returns `None` when `..` segments would escape.
///
fn within_root(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut joined = PathBuf::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(segment) => joined.push(segment),
            Component::ParentDir => {
                if !joined.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    Some(root.join(joined))
}

fn has_dotfile_segment(relative: &str) -> bool {
    relative
        .split('/')
        .any(|segment| segment.len() > 1 && segment.starts_with('.'))
}

fn stat_file(path: PathBuf) -> Option<ResolvedFile> {
    let metadata = fs::metadata(&path).ok()?;

    if metadata.is_file() {
        let mime_type = mime_type_for(&path);

        Some(ResolvedFile {
            path,
            metadata,
            mime_type,
        })
    } else {
        None
    }
}

#[derive(Clone)]
pub(crate) struct ResolveConfig {
    pub root: PathBuf,
    pub index: Vec<String>,
    pub extensions: Vec<String>,
    pub dotfiles: Dotfiles,
    pub redirect: bool,
}

/// Stat a path for `send_file`: the target must be a regular file.
///
pub(crate) fn stat_for_send(path: PathBuf) -> Result<ResolvedFile, crate::error::Error> {
    match stat_file(path) {
        Some(found) => Ok(found),
        None => Err(crate::error::Error::not_found(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ))
        .as_operational()),
    }
}

/// Resolve a decoded request path against the root. Runs on the blocking
/// thread pool: everything here touches the file system.
///
pub(crate) fn resolve(config: &ResolveConfig, relative: &str, trailing_slash: bool) -> Resolution {
    // Containment is checked before any file system access.
    let Some(candidate) = within_root(&config.root, relative) else {
        return Resolution::Escaped;
    };

    match config.dotfiles {
        Dotfiles::Allow => {}
        Dotfiles::Deny => {
            if has_dotfile_segment(relative) {
                return Resolution::Denied;
            }
        }
        Dotfiles::Ignore => {
            if has_dotfile_segment(relative) {
                return Resolution::NotFound;
            }
        }
    }

    // Resolve symlinks and re-check containment against the canonical
    // root before anything is opened.
    let root = match fs::canonicalize(&config.root) {
        Ok(root) => root,
        Err(_) => return Resolution::NotFound,
    };

    if let Ok(canonical) = fs::canonicalize(&candidate) {
        if !canonical.starts_with(&root) {
            return Resolution::Escaped;
        }
    }

    if candidate.is_dir() {
        if !trailing_slash && config.redirect {
            return Resolution::Directory;
        }

        for index in &config.index {
            if let Some(found) = stat_file(candidate.join(index)) {
                return Resolution::Found(found);
            }
        }

        return Resolution::NotFound;
    }

    if let Some(found) = stat_file(candidate.clone()) {
        return Resolution::Found(found);
    }

    // Fall back to the configured extensions for extensionless requests.
    if !trailing_slash {
        for extension in &config.extensions {
            let mut with_extension = candidate.clone().into_os_string();

            with_extension.push(".");
            with_extension.push(extension);

            if let Some(found) = stat_file(PathBuf::from(with_extension)) {
                return Resolution::Found(found);
            }
        }
    }

    Resolution::NotFound
}

#[cfg(test)]
mod tests {
    use super::{has_dotfile_segment, within_root};
    use std::path::{Path, PathBuf};

    #[test]
    fn parent_segments_cannot_escape() {
        let root = Path::new("/srv/public");

        assert_eq!(
            within_root(root, "a/../b.txt"),
            Some(PathBuf::from("/srv/public/b.txt"))
        );
        assert_eq!(within_root(root, "../secret"), None);
        assert_eq!(within_root(root, "a/../../secret"), None);
    }

    #[test]
    fn dotfile_segments_are_detected() {
        assert!(has_dotfile_segment(".env"));
        assert!(has_dotfile_segment("config/.git/HEAD"));
        assert!(!has_dotfile_segment("notes/file.txt"));
        assert!(!has_dotfile_segment("."));
    }
}
