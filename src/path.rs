//! Validation of requested filesystem paths. Request paths are percent-decoded exactly once and
//! lexically normalized before any containment check, so every comparison in this crate is done on
//! clean absolute paths

use std::path::{Component, Path, PathBuf};

use tracing::{info, trace};

/// Lexically normalizes a path: `.` segments are dropped, `..` segments remove the previous
/// segment and trailing slashes disappear. The filesystem is never consulted.
///
/// A `..` directly under the root is discarded (`/..` is `/`), matching how the kernel resolves
/// it. Leading `..` segments of a relative path are preserved.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            Component::Normal(segment) => normalized.push(segment),
        }
    }
    normalized
}

/// Returns true if `candidate` is `parent` or lies anywhere beneath it.
///
/// Both paths are normalized first, which means the relative path from `parent` to `candidate`
/// never needs a `..` segment when this returns true. Comparison is done per path component, so
/// `/data/foobar` is not a subfolder of `/data/foo`.
pub fn is_subfolder(parent: impl AsRef<Path>, candidate: impl AsRef<Path>) -> bool {
    let parent = normalize(parent.as_ref());
    let candidate = normalize(candidate.as_ref());
    if parent.as_os_str().is_empty() {
        return false;
    }
    candidate.starts_with(&parent)
}

/// Turns a raw (still percent-encoded) request path into the filesystem path it addresses.
///
/// When a `data_root` is configured, a request that already names a path under the root is used
/// as is, anything else is treated as relative to the root. Either way the result must stay inside
/// the root. Without a root the normalized absolute path is returned and bounding is left entirely
/// to the authorizer.
///
/// Returns `None` for undecodable input, relative paths and any attempt to escape the root.
pub fn get_valid_path(request_path: &str, data_root: Option<&Path>) -> Option<PathBuf> {
    let decoded = match urlencoding::decode(request_path) {
        Ok(d) => d,
        Err(e) => {
            info!(error = %e, "Request path is not valid UTF-8 once decoded");
            return None;
        }
    };
    let requested = Path::new(decoded.as_ref());

    let root = match data_root {
        None => {
            let normalized = normalize(requested);
            if !normalized.is_absolute() {
                info!(path = %decoded, "Request path is not absolute");
                return None;
            }
            trace!(path = %normalized.display(), "Resolved request path");
            return Some(normalized);
        }
        Some(r) => normalize(r),
    };

    // Decide on the un-normalized path so that `{root}/../x` is rejected instead of being
    // re-rooted as `{root}/x`
    let candidate = if requested.starts_with(&root) {
        normalize(requested)
    } else {
        let relative = decoded.trim_start_matches('/');
        normalize(&root.join(relative))
    };

    if !is_subfolder(&root, &candidate) {
        info!(path = %decoded, root = %root.display(), "Request path escapes the data root");
        return None;
    }
    trace!(path = %candidate.display(), "Resolved request path");
    Some(candidate)
}
