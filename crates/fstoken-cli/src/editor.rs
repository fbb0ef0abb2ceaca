//! Pluggable "present this content, return edited content" abstraction for
//! the Invoke round-trip. The production path spawns `$EDITOR` against a
//! temp file; tests substitute a fixed transform instead of depending on an
//! interactive terminal.

use std::io::Write;
use std::process::Command;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

pub trait ContentEditor {
    /// Present `content` for editing. `writable` reflects the Invoke
    /// grant: `false` (a `READ` grant) still opens the editor but any
    /// changes the user makes are discarded by the caller, not enforced
    /// here — the broker is the actual authority on what it will accept.
    fn edit(&self, content: &[u8], writable: bool) -> Result<Vec<u8>>;
}

/// Writes `content` to a temp file, spawns `$EDITOR` (falling back to
/// `vi`), waits for it to exit, and rereads the file.
pub struct ExternalEditor;

impl ContentEditor for ExternalEditor {
    fn edit(&self, content: &[u8], writable: bool) -> Result<Vec<u8>> {
        let mut file = NamedTempFile::new().context("creating temp file for editor")?;
        file.write_all(content).context("writing content to temp file")?;
        file.flush().context("flushing temp file")?;
        let path = file.path().to_path_buf();

        if !writable {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o400))
                    .context("marking temp file read-only")?;
            }
        }

        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
        let status = Command::new(&editor)
            .arg(&path)
            .status()
            .with_context(|| format!("spawning editor `{editor}`"))?;
        if !status.success() {
            anyhow::bail!("editor `{editor}` exited with {status}");
        }

        std::fs::read(&path).context("reading back edited content")
    }
}

/// Returns a caller-supplied byte string unchanged, for tests.
pub struct FixedEditor {
    pub result: Vec<u8>,
}

impl ContentEditor for FixedEditor {
    fn edit(&self, _content: &[u8], _writable: bool) -> Result<Vec<u8>> {
        Ok(self.result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_editor_returns_configured_result() {
        let editor = FixedEditor {
            result: b"edited".to_vec(),
        };
        assert_eq!(editor.edit(b"original", true).unwrap(), b"edited");
    }
}
