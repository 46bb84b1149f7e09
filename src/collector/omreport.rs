use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Runs the OpenManage `omreport` CLI and splits its semicolon-separated
/// output into rows of trimmed fields.
#[derive(Debug, Clone)]
pub struct Omreport {
    program: String,
}

impl Omreport {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Run `omreport <args> -fmt ssv`.
    ///
    /// A spawn failure or non-zero exit status is an error. The child is
    /// killed if the returned future is dropped.
    pub async fn run(&self, args: &[&str]) -> Result<Vec<Vec<String>>> {
        let output = Command::new(&self.program)
            .args(args)
            .args(["-fmt", "ssv"])
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute {} {}", self.program, args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                stderr.trim()
            );
        }

        Ok(parse_ssv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Split ssv output into rows; blank lines are skipped
pub fn parse_ssv(output: &str) -> Vec<Vec<String>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(';').map(|f| f.trim().to_string()).collect())
        .collect()
}

/// Map an omreport status column to a gauge value: 0 healthy, 1 otherwise.
pub fn severity(status: &str) -> &'static str {
    match status {
        "Ok" | "Non-Critical" => "0",
        _ => "1",
    }
}

/// Replace characters outside `[A-Za-z0-9-_./]` with `_`
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '/' => c,
            _ => '_',
        })
        .collect()
}

/// Object id as printed by omreport (`0:1:2`) turned into a label value
pub fn object_id(raw: &str) -> String {
    raw.replace(':', "_")
}

/// Numeric part of a reading such as `41.0 C` or `3600 RPM`, if the unit matches.
pub fn reading<'a>(field: &'a str, unit: &str) -> Option<&'a str> {
    let mut parts = field.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(value), Some(u), None) if u == unit => Some(value),
        _ => None,
    }
}

/// True when the first column is a numeric row index rather than a header
pub fn is_indexed(fields: &[String]) -> bool {
    fields.first().is_some_and(|f| f.parse::<u32>().is_ok())
}
