use std::path::PathBuf;

const DEFAULT_STRENGTH: u8 = 2;

/// Operator configuration for one analysis run. Everything except the
/// bundle directory comes from the environment so CI wrappers can pin a
/// setup without rebuilding command lines.
#[derive(Debug, Clone)]
pub struct RuntimeArgs {
    /// Directory holding `metadata.json`, `disassembly.txt`, `srcmap.txt`
    /// and `blocks.txt`.
    pub bundle_dir: PathBuf,
    /// Optional execution trace to replay into the coverage ledger.
    pub trace_file: Option<PathBuf>,
    /// Covering-array generator jar; generation degrades to empty rounds
    /// when unset.
    pub generator_jar: Option<PathBuf>,
    pub java_bin: String,
    pub work_dir: PathBuf,
    /// Covering-array interaction strength.
    pub strength: u8,
    /// Print the resolved configuration and exit.
    pub explain_config: bool,
}

fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_strength_from_env() -> anyhow::Result<u8> {
    let raw = match std::env::var("GRIDFUZZ_STRENGTH") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(DEFAULT_STRENGTH),
    };
    let parsed: u8 = raw.trim().parse().map_err(|_| {
        anyhow::anyhow!(
            "invalid GRIDFUZZ_STRENGTH '{}': expected a small positive integer",
            raw.trim()
        )
    })?;
    if parsed == 0 {
        return Err(anyhow::anyhow!("GRIDFUZZ_STRENGTH must be at least 1"));
    }
    Ok(parsed)
}

fn parse_runtime_args_from_iter<I, S>(args: I) -> anyhow::Result<RuntimeArgs>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let supplied: Vec<String> = args
        .into_iter()
        .map(|arg| arg.as_ref().to_string())
        .collect();

    let bundle_dir = supplied
        .first()
        .map(PathBuf::from)
        .or_else(|| std::env::var("GRIDFUZZ_BUNDLE").ok().map(PathBuf::from))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no artifact bundle given: pass a directory argument or set GRIDFUZZ_BUNDLE"
            )
        })?;

    let trace_file = supplied
        .get(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var("GRIDFUZZ_TRACE").ok().map(PathBuf::from));

    if supplied.len() > 2 {
        return Err(anyhow::anyhow!(
            "unexpected extra arguments: {} (only <bundle-dir> [trace-file] are accepted)",
            supplied[2..].join(" ")
        ));
    }

    let generator_jar = std::env::var("GRIDFUZZ_CA_JAR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    let java_bin = std::env::var("GRIDFUZZ_JAVA_BIN")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "java".to_string());
    let work_dir = std::env::var("GRIDFUZZ_WORK_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("gridfuzz-work"));
    let explain_config = std::env::var("GRIDFUZZ_EXPLAIN_CONFIG")
        .ok()
        .and_then(|raw| parse_bool_flag(&raw))
        .unwrap_or(false);

    Ok(RuntimeArgs {
        bundle_dir,
        trace_file,
        generator_jar,
        java_bin,
        work_dir,
        strength: parse_strength_from_env()?,
        explain_config,
    })
}

pub fn parse_runtime_args() -> anyhow::Result<RuntimeArgs> {
    parse_runtime_args_from_iter(std::env::args().skip(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_env() {
        for key in [
            "GRIDFUZZ_BUNDLE",
            "GRIDFUZZ_TRACE",
            "GRIDFUZZ_CA_JAR",
            "GRIDFUZZ_JAVA_BIN",
            "GRIDFUZZ_WORK_DIR",
            "GRIDFUZZ_STRENGTH",
            "GRIDFUZZ_EXPLAIN_CONFIG",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn requires_a_bundle_source() {
        let _guard = env_lock().lock().expect("env lock");
        clear_env();
        assert!(parse_runtime_args_from_iter(Vec::<&str>::new()).is_err());
    }

    #[test]
    fn positional_bundle_and_trace() {
        let _guard = env_lock().lock().expect("env lock");
        clear_env();
        let parsed =
            parse_runtime_args_from_iter(["bundles/vault", "traces/run1.txt"]).unwrap();
        assert_eq!(parsed.bundle_dir, PathBuf::from("bundles/vault"));
        assert_eq!(parsed.trace_file, Some(PathBuf::from("traces/run1.txt")));
        assert_eq!(parsed.strength, DEFAULT_STRENGTH);
        assert_eq!(parsed.java_bin, "java");
        assert!(parsed.generator_jar.is_none());
    }

    #[test]
    fn rejects_zero_strength() {
        let _guard = env_lock().lock().expect("env lock");
        clear_env();
        std::env::set_var("GRIDFUZZ_STRENGTH", "0");
        let parsed = parse_runtime_args_from_iter(["bundles/vault"]);
        std::env::remove_var("GRIDFUZZ_STRENGTH");
        assert!(parsed.is_err());
    }
}
