use std::path::Path;

/// Local path of an event: the watch root joined with the root-relative name.
/// Always forward-slash separated.
pub fn local_path(watch_root: &Path, name: &str) -> String {
    let root = watch_root.to_string_lossy().replace('\\', "/");
    format!("{}/{}", root.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Remote path of an event: `remote_root/dir_name/name`, where `dir_name` is
/// the base name of the watch root and `remote_root` is the configured prefix
/// for this sync dir (may be empty).
pub fn remote_path(watch_root: &Path, remote_root: &str, name: &str) -> String {
    let dir_name = watch_root
        .file_name()
        .map(|part| part.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.trim_start_matches('/');
    let remote_root = remote_root.trim_matches('/');
    if remote_root.is_empty() {
        format!("{dir_name}/{name}")
    } else {
        format!("{remote_root}/{dir_name}/{name}")
    }
}

/// Strip the "my_files" root synonym and leading slashes, leaving a relative
/// POSIX path ready for segment-wise traversal from the my-files root.
pub fn normalize_remote_path(mut path: &str) -> &str {
    loop {
        let trimmed = path.trim_start_matches("./").trim_start_matches('/');
        let next = match trimmed.strip_prefix("my_files/") {
            Some(rest) => rest,
            None if trimmed == "my_files" => "",
            None => trimmed,
        };
        if next.len() == path.len() {
            return next;
        }
        path = next;
    }
}

/// Path segments of a remote path, root synonyms stripped.
pub fn remote_segments(path: &str) -> impl Iterator<Item = &str> {
    normalize_remote_path(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
}

/// Everything before the final slash; empty for top-level names.
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// The final path component.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}
