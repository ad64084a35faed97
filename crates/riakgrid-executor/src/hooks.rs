//! Pre-launch hooks run against the unpacked database distribution.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ExecutorError, ExecutorResult};

/// Inert stand-in for the bundled port mapper.
const INERT_STUB: &str = "#!/bin/sh\nexit 0\n";

/// Ensure the bundled Erlang port mapper cannot start.
///
/// The distribution ships its own `epmd` under `erts-*/bin/`; the node
/// must use the embedded substitute instead, so the bundled binary is
/// replaced with a stub that exits immediately. Exactly one bundled copy
/// is expected; anything else means an unexpected distribution layout.
pub fn disable_port_mapper(riak_root: &Path) -> ExecutorResult<PathBuf> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(riak_root)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("erts-") {
            let epmd = entry.path().join("bin/epmd");
            if epmd.is_file() {
                candidates.push(epmd);
            }
        }
    }

    if candidates.len() != 1 {
        return Err(ExecutorError::Config(format!(
            "expected exactly one bundled epmd under {}, found {}",
            riak_root.display(),
            candidates.len()
        )));
    }

    let epmd = candidates.remove(0);
    fs::write(&epmd, INERT_STUB)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&epmd, fs::Permissions::from_mode(0o755))?;
    }
    info!(path = %epmd.display(), "bundled port mapper disabled");
    Ok(epmd)
}
