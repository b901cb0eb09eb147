//! Allow list of directory roots a path must resolve under.
//!
//! Membership is decided on the resolved path (absolute, symlinks followed),
//! never on the literal string, and by whole components: `/home/user2` is
//! not under `/home/user`. Anything that cannot be resolved is refused.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPolicy {
    roots: Vec<PathBuf>,
}

impl PathPolicy {
    /// Canonicalize `roots`. Roots that do not exist are dropped.
    pub fn new<I>(roots: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut canonical: Vec<PathBuf> = Vec::new();
        for root in roots {
            match root.canonicalize() {
                Ok(resolved) if resolved.is_dir() => {
                    if !canonical.contains(&resolved) {
                        canonical.push(resolved);
                    }
                }
                Ok(_) => debug!(
                    "Ignoring allowed root that is not a directory: {}",
                    root.display()
                ),
                Err(_) => debug!("Ignoring missing allowed root: {}", root.display()),
            }
        }
        Self { roots: canonical }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve `path` for membership testing.
    ///
    /// An existing path is canonicalized. A path with nothing at it resolves
    /// through its parent, with the final component re-attached. Returns
    /// `None` for broken symlinks, missing parents and `..` leaves.
    pub fn resolve(path: &Path) -> Option<PathBuf> {
        match fs::symlink_metadata(path) {
            Ok(_) => path.canonicalize().ok(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = match path.components().next_back() {
                    Some(Component::Normal(name)) => name,
                    _ => return None,
                };
                let parent = match path.parent() {
                    Some(p) if p.as_os_str().is_empty() => Path::new("."),
                    Some(p) => p,
                    None => return None,
                };
                parent.canonicalize().ok().map(|p| p.join(name))
            }
            Err(_) => None,
        }
    }

    pub fn is_allowed(&self, path: &Path) -> bool {
        Self::resolve(path).is_some_and(|resolved| self.contains(&resolved))
    }

    /// The resolved path, or `PathDenied`.
    pub fn check(&self, path: &Path) -> Result<PathBuf> {
        match Self::resolve(path) {
            Some(resolved) if self.contains(&resolved) => Ok(resolved),
            _ => Err(Error::PathDenied(path.to_path_buf())),
        }
    }

    fn contains(&self, resolved: &Path) -> bool {
        self.roots.iter().any(|root| resolved.starts_with(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn setup() -> (tempfile::TempDir, PathBuf, PathPolicy) {
        let tmp = tempfile::tempdir().unwrap();
        let allowed = tmp.path().join("home");
        fs::create_dir_all(allowed.join("sub")).unwrap();
        let policy = PathPolicy::new([allowed.clone()]);
        (tmp, allowed, policy)
    }

    #[test]
    fn paths_under_root_are_allowed() {
        let (_tmp, home, policy) = setup();
        let file = home.join("sub/.bashrc");
        fs::write(&file, "x").unwrap();

        assert!(policy.is_allowed(&home));
        assert!(policy.is_allowed(&file));
        // Not yet created, parent exists
        assert!(policy.is_allowed(&home.join("sub/.zshrc")));
        assert_eq!(policy.check(&file).unwrap(), file.canonicalize().unwrap());
    }

    #[test]
    fn sibling_prefix_is_not_inside() {
        let (tmp, home, policy) = setup();
        let sibling = tmp.path().join("home2");
        fs::create_dir_all(&sibling).unwrap();

        assert!(!policy.is_allowed(&sibling));
        assert!(!policy.is_allowed(&sibling.join("file")));
        assert!(policy.is_allowed(&home.join("file")));
    }

    #[test]
    fn dot_dot_escapes_are_resolved() {
        let (tmp, home, policy) = setup();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();

        assert!(!policy.is_allowed(&home.join("sub/../../outside")));
        assert!(!policy.is_allowed(&home.join("sub/../../outside/new-file")));
        assert!(policy.is_allowed(&home.join("sub/../sub")));
    }

    #[test]
    fn unresolvable_paths_fail_closed() {
        let (_tmp, home, policy) = setup();

        // Missing parent
        assert!(!policy.is_allowed(&home.join("missing/dir/file")));
        // `..` leaf under a missing directory
        assert!(!policy.is_allowed(&home.join("missing/..")));

        let err = policy.check(&home.join("missing/dir/file")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_judged_by_target() {
        let (tmp, home, policy) = setup();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("secret"), "x").unwrap();

        let escape = home.join("escape");
        std::os::unix::fs::symlink(outside.join("secret"), &escape).unwrap();
        assert!(!policy.is_allowed(&escape));

        let inner = home.join("inner");
        std::os::unix::fs::symlink(home.join("sub"), &inner).unwrap();
        assert!(policy.is_allowed(&inner));

        let broken = home.join("broken");
        std::os::unix::fs::symlink(home.join("nowhere"), &broken).unwrap();
        assert!(!policy.is_allowed(&broken));
    }

    #[test]
    fn missing_roots_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new([tmp.path().join("absent"), tmp.path().to_path_buf()]);
        assert_eq!(policy.roots(), [tmp.path().canonicalize().unwrap()]);
    }

    #[test]
    fn empty_policy_allows_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!PathPolicy::default().is_allowed(tmp.path()));
    }
}
