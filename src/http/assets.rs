// Static web client files (index.html, js/)

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a file below the web root; `None` if missing or the path escapes the root
    pub async fn load(&self, relative: &str) -> Option<(Vec<u8>, &'static str)> {
        let Some(path) = self.resolve(relative) else {
            warn!("Rejected static path {:?}", relative);
            return None;
        };
        match tokio::fs::read(&path).await {
            Ok(data) => Some((data, content_type(&path))),
            Err(e) => {
                debug!("Static file {:?} unavailable: {}", path, e);
                None
            }
        }
    }

    /// Join `relative` onto the root, refusing anything but plain name segments
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        if relative.is_empty() || relative.contains('\\') || relative.contains('\0') {
            return None;
        }
        let rel = Path::new(relative);
        let mut depth = 0;
        for component in rel.components() {
            match component {
                Component::Normal(_) => depth += 1,
                _ => return None,
            }
        }
        // "a/./b" normalizes away the dot, but reject it anyway: only plain names
        if depth == 0
            || relative
                .split('/')
                .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return None;
        }
        Some(self.root.join(rel))
    }
}

pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("js") | Some("mjs") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
