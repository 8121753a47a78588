//! Template Module
//!
//! Rewrites a proxy configuration before it is handed to the process that
//! consumes it: placeholder substitution first, then port rewriting.

mod ports;
mod strings;

pub use ports::{replace_ports, PortRewriter, PortSubstitution};
pub use strings::replace_strings;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{McError, Result};

/// Render `src` into `out_dir` under the same file name
///
/// Nothing is written if either pass fails.
pub fn render_config_file<K, V>(
    src: &Path,
    out_dir: &Path,
    replacements: impl IntoIterator<Item = (K, V)>,
    ports: Option<&PortSubstitution>,
) -> Result<PathBuf>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let file_name = src.file_name().ok_or_else(|| {
        McError::InvalidArgument(format!("{} does not name a file", src.display()))
    })?;

    let text = fs::read_to_string(src)?;
    let mut rendered = replace_strings(&text, replacements);
    if let Some(ports) = ports {
        rendered = replace_ports(&rendered, ports)?;
    }

    let dest = out_dir.join(file_name);
    fs::write(&dest, rendered)?;
    tracing::debug!("Rendered {} to {}", src.display(), dest.display());
    Ok(dest)
}
