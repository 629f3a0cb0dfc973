//! Rewrites of the launcher scripts found among the copied dispatchers.
//!
//! Dispatchers produced by a conda build point at the interpreter of the conda
//! environment. Inside a wheel the interpreter is whatever `python` is active,
//! so the interpreter lookup is patched after copying.
use fs_err as fs;
use std::path::{Path, PathBuf};

use content_inspector::ContentType;

use crate::platform::DispatcherRewrite;

const PYTHON_APP_LINE: &str =
    r#"LIBTBX_PYEXE="$LIBTBX_PREFIX/python.app/Contents/MacOS/$LIBTBX_PYEXE_BASENAME""#;
const PYTHON_BIN_LINE: &str = r#"LIBTBX_PYEXE="$LIBTBX_PREFIX/bin/$LIBTBX_PYEXE_BASENAME""#;

const BATCH_INTERPRETER: &str = r"@set LIBTBX_PYEXE=%LIBTBX_PREFIX%\..\python.exe";
const BATCH_SCRIPT_LAUNCH: &str = r#"@"%LIBTBX_PYEXE%" "%LIBTBX_PREFIX%\..\lib\site-packages"#;

/// Apply `rewrite` to every text dispatcher in `dispatchers`.
///
/// Returns the files that were modified.
pub fn rewrite_dispatchers(
    rewrite: DispatcherRewrite,
    dispatchers: &[PathBuf],
) -> std::io::Result<Vec<PathBuf>> {
    let mut modified = Vec::new();
    if rewrite == DispatcherRewrite::None {
        return Ok(modified);
    }

    for dispatcher in dispatchers {
        if rewrite == DispatcherRewrite::WindowsBatch && !is_batch_file(dispatcher) {
            continue;
        }
        let Some(content) = read_text(dispatcher)? else {
            tracing::trace!("Not rewriting binary dispatcher {}", dispatcher.display());
            continue;
        };

        let rewritten = match rewrite {
            DispatcherRewrite::MacOsPythonApp => remove_python_app(&content),
            DispatcherRewrite::WindowsBatch => simplify_batch_file(&content),
            DispatcherRewrite::None => continue,
        };

        if rewritten != content {
            fs::write(dispatcher, rewritten)?;
            tracing::debug!("Rewrote dispatcher {}", dispatcher.display());
            modified.push(dispatcher.clone());
        }
    }

    Ok(modified)
}

fn is_batch_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bat"))
}

/// The content of `path` if it is a UTF-8 text file.
fn read_text(path: &Path) -> std::io::Result<Option<String>> {
    let bytes = fs::read(path)?;
    let head = &bytes[..bytes.len().min(1024)];
    if content_inspector::inspect(head) == ContentType::BINARY {
        return Ok(None);
    }
    Ok(String::from_utf8(bytes).ok())
}

/// Replace the `python.app` interpreter of macOS dispatchers with `bin/python`.
pub fn remove_python_app(content: &str) -> String {
    content
        .split_inclusive('\n')
        .map(|line| {
            if line.contains(PYTHON_APP_LINE) {
                let ending = &line[line.trim_end_matches(['\r', '\n']).len()..];
                format!("{PYTHON_BIN_LINE}{ending}")
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Simplify a Windows batch dispatcher so that it runs from the wheel layout.
///
/// The interpreter is taken from `PATH`, scripts below `site-packages` are
/// resolved relative to the batch file and `PATH` is left alone. The result
/// uses CRLF line endings.
pub fn simplify_batch_file(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let line = if line.contains(BATCH_INTERPRETER) {
            "@set LIBTBX_PYEXE=python.exe".to_string()
        } else if line.contains(BATCH_SCRIPT_LAUNCH) {
            let script = line
                .rsplit("site-packages")
                .next()
                .unwrap_or_default()
                .trim();
            format!(r#"@"%LIBTBX_PYEXE%" "%~dp0\..\..\..{script}"#)
        } else if line.contains("PATH=") {
            continue;
        } else {
            line.trim().to_string()
        };
        out.push_str(&line);
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_app_is_replaced() {
        let script = "#! /bin/sh\n\
            LIBTBX_PREFIX=\"$(dirname \"$0\")/..\"\n  \
            LIBTBX_PYEXE=\"$LIBTBX_PREFIX/python.app/Contents/MacOS/$LIBTBX_PYEXE_BASENAME\"\n\
            exec \"$LIBTBX_PYEXE\" \"$@\"\n";

        insta::assert_snapshot!(remove_python_app(script), @r#"
        #! /bin/sh
        LIBTBX_PREFIX="$(dirname "$0")/.."
        LIBTBX_PYEXE="$LIBTBX_PREFIX/bin/$LIBTBX_PYEXE_BASENAME"
        exec "$LIBTBX_PYEXE" "$@"
        "#);
    }

    #[test]
    fn python_app_keeps_line_endings() {
        let script = "a\r\nLIBTBX_PYEXE=\"$LIBTBX_PREFIX/python.app/Contents/MacOS/$LIBTBX_PYEXE_BASENAME\"\r\nb";
        assert_eq!(
            remove_python_app(script),
            "a\r\nLIBTBX_PYEXE=\"$LIBTBX_PREFIX/bin/$LIBTBX_PYEXE_BASENAME\"\r\nb"
        );
    }

    #[test]
    fn batch_file_is_simplified() {
        let script = concat!(
            "@setlocal\r\n",
            "@set LIBTBX_PREFIX=%~dp0\r\n",
            "@set LIBTBX_PYEXE=%LIBTBX_PREFIX%\\..\\python.exe\r\n",
            "@set PATH=%LIBTBX_PREFIX%\\..\\Library\\bin;%PATH%\r\n",
            "  @\"%LIBTBX_PYEXE%\" \"%LIBTBX_PREFIX%\\..\\lib\\site-packages\\cctbx\\command_line\\symmetry.py\" %*  \r\n",
        );

        let simplified = simplify_batch_file(script);
        assert!(simplified.ends_with("\r\n"));
        insta::assert_snapshot!(simplified.replace("\r\n", "\n"), @r#"
        @setlocal
        @set LIBTBX_PREFIX=%~dp0
        @set LIBTBX_PYEXE=python.exe
        @"%LIBTBX_PYEXE%" "%~dp0\..\..\..\cctbx\command_line\symmetry.py" %*
        "#);
    }

    #[test]
    fn only_text_dispatchers_are_touched() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("cctbx.python");
        let binary = tmp.path().join("cctbx.lattice_symmetry");
        let unrelated = tmp.path().join("cctbx.help");
        fs::write(
            &script,
            "LIBTBX_PYEXE=\"$LIBTBX_PREFIX/python.app/Contents/MacOS/$LIBTBX_PYEXE_BASENAME\"\n",
        )
        .unwrap();
        let mut macho = vec![0xcf, 0xfa, 0xed, 0xfe, 0x0c, 0x00, 0x00, 0x01, 0x00];
        macho.extend_from_slice(b"python.app");
        fs::write(&binary, &macho).unwrap();
        fs::write(&unrelated, "#!/bin/sh\necho help\n").unwrap();

        let modified = rewrite_dispatchers(
            DispatcherRewrite::MacOsPythonApp,
            &[script.clone(), binary.clone(), unrelated],
        )
        .unwrap();

        assert_eq!(modified, [script.clone()]);
        assert_eq!(fs::read(&binary).unwrap(), macho);
        assert!(fs::read_to_string(&script).unwrap().contains("/bin/"));
    }

    #[test]
    fn windows_rewrite_only_touches_batch_files() {
        let tmp = tempfile::tempdir().unwrap();
        let batch = tmp.path().join("tool.bat");
        let other = tmp.path().join("tool-script.py");
        fs::write(&batch, "@set PATH=x\n@echo on\n").unwrap();
        fs::write(&other, "  import sys\n").unwrap();

        let modified =
            rewrite_dispatchers(DispatcherRewrite::WindowsBatch, &[batch.clone(), other.clone()])
                .unwrap();

        assert_eq!(modified, [batch.clone()]);
        assert_eq!(fs::read_to_string(&batch).unwrap(), "@echo on\r\n");
        assert_eq!(fs::read_to_string(&other).unwrap(), "  import sys\n");
    }

    #[test]
    fn no_rewrite_is_a_no_op() {
        let modified =
            rewrite_dispatchers(DispatcherRewrite::None, &[PathBuf::from("does-not-exist")])
                .unwrap();
        assert!(modified.is_empty());
    }
}
