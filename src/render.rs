//! Template rendering: mirror the templates root into the destination
//! root, substituting variables.
//!
//! Every regular file under the source tree renders to the same relative
//! path under the destination. Existing destinations are left alone, so a
//! second run changes nothing. Created files and directories carry the
//! mode and ownership of their source counterparts.

use std::fs;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tera::Tera;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::vars::VariableSpace;

/// Render the tree rooted at `src_root` into `dst_root`.
///
/// `jinja_root` supplies the include/import namespace: every template under
/// it is registered by its path relative to that root.
pub fn render_tree(
    src_root: &Path,
    jinja_root: &Path,
    dst_root: &Path,
    vars: &VariableSpace,
) -> Result<(), Error> {
    let mut tera = includes_env(jinja_root)?;
    let context = tera::Context::from_serialize(vars).map_err(|e| render_err(src_root, &e))?;

    let mut sources = Vec::new();
    collect_files(src_root, &mut sources)?;
    sources.sort();

    for src in sources {
        let rel = src
            .strip_prefix(src_root)
            .expect("collected paths live under the source root");
        let dst = dst_root.join(rel);
        if dst.exists() {
            debug!(dst = %dst.display(), "destination exists, skipping");
            continue;
        }
        ensure_parents(src_root, dst_root, rel)?;
        render_file(&mut tera, &src, &dst, &context)?;
    }
    Ok(())
}

/// Build the Tera environment holding the include templates.
fn includes_env(jinja_root: &Path) -> Result<Tera, Error> {
    let mut tera = if jinja_root.is_dir() {
        let glob = format!("{}/**/*", jinja_root.display());
        Tera::new(&glob).map_err(|e| render_err(jinja_root, &e))?
    } else {
        Tera::default()
    };
    // Rendered files are config files, not markup; never HTML-escape.
    tera.autoescape_on(Vec::new());
    Ok(tera)
}

/// Recursively gather regular files. Symbolic links are not followed.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), Error> {
    let entries = fs::read_dir(dir).map_err(|e| render_err(dir, &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| render_err(dir, &e))?;
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).map_err(|e| render_err(&path, &e))?;
        if meta.file_type().is_symlink() {
            warn!(path = %path.display(), "symlink in template tree, skipping");
        } else if meta.is_dir() {
            collect_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// Create any missing ancestors of `rel` under `dst_root`, copying mode and
/// ownership from the corresponding source directories.
fn ensure_parents(src_root: &Path, dst_root: &Path, rel: &Path) -> Result<(), Error> {
    let Some(parent) = rel.parent() else {
        return Ok(());
    };
    let mut partial = PathBuf::new();
    for component in parent.components() {
        partial.push(component);
        let dst_dir = dst_root.join(&partial);
        if dst_dir.is_dir() {
            continue;
        }
        let src_dir = src_root.join(&partial);
        let meta = fs::metadata(&src_dir).map_err(|e| render_err(&src_dir, &e))?;
        fs::create_dir(&dst_dir).map_err(|e| render_err(&dst_dir, &e))?;
        fs::set_permissions(&dst_dir, meta.permissions()).map_err(|e| render_err(&dst_dir, &e))?;
        std::os::unix::fs::chown(&dst_dir, Some(meta.uid()), Some(meta.gid()))
            .map_err(|e| render_err(&dst_dir, &e))?;
        debug!(dir = %dst_dir.display(), "created parent directory");
    }
    Ok(())
}

/// Render a single template and write it with the source's mode and owner.
fn render_file(
    tera: &mut Tera,
    src: &Path,
    dst: &Path,
    context: &tera::Context,
) -> Result<(), Error> {
    let name = src.display().to_string();
    tera.add_template_file(src, Some(name.as_str()))
        .map_err(|e| render_err(src, &e))?;
    let rendered = tera.render(&name, context).map_err(|e| render_err(src, &e))?;

    let meta = fs::metadata(src).map_err(|e| render_err(src, &e))?;
    let mode = meta.permissions().mode() & 0o7777;
    {
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(dst)
            .map_err(|e| render_err(src, &e))?;
        file.write_all(rendered.as_bytes())
            .map_err(|e| render_err(src, &e))?;
    }
    // The open mode is subject to the umask; fix the exact bits up after.
    fs::set_permissions(dst, fs::Permissions::from_mode(mode)).map_err(|e| render_err(src, &e))?;
    std::os::unix::fs::chown(dst, Some(meta.uid()), Some(meta.gid()))
        .map_err(|e| render_err(src, &e))?;

    info!(src = %src.display(), dst = %dst.display(), "rendered template");
    Ok(())
}

fn render_err(path: &Path, cause: &dyn std::fmt::Display) -> Error {
    Error::RenderFailed {
        path: path.to_path_buf(),
        reason: cause.to_string(),
    }
}
