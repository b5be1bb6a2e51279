//! Interpreter argument builder.
//!
//! ## Flag Reference
//! - `-I`: isolated mode. Ignores `PYTHON*` environment variables and the
//!   user site directory, and keeps the script directory off `sys.path`.
//! - `-B`: do not write `.pyc` files next to the temporary script.
//! - `-S`: skip the implicit `import site`.

use std::ffi::OsString;
use std::path::Path;

/// Builds the argument list that runs `script` in isolated mode.
#[must_use]
pub fn build_args(script: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-I"),
        OsString::from("-B"),
        OsString::from("-S"),
        script.as_os_str().to_os_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_flags_precede_script() {
        let args = build_args(Path::new("/tmp/abc.py"));
        let args_str: Vec<&str> = args.iter().filter_map(|s| s.to_str()).collect();

        assert_eq!(args_str, vec!["-I", "-B", "-S", "/tmp/abc.py"]);
    }
}
