//! `.env` file loading. Variables already present in the process environment win.

use std::fs;
use std::path::Path;

/// Load `path` into the process environment without overriding existing variables.
/// Returns how many variables were set.
pub fn load(path: &Path) -> Result<usize, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut applied = 0;
    for (key, value) in parse(&content).map_err(|e| format!("{}:{}", path.display(), e))? {
        if std::env::var_os(&key).is_none() {
            // runs before any other thread exists
            unsafe {
                std::env::set_var(&key, value);
            }
            applied += 1;
        }
    }
    Ok(applied)
}

/// Parse `KEY=value` lines. Blank lines and `#` comments are skipped, an
/// optional `export ` prefix is accepted, values may be single or double quoted.
pub fn parse(content: &str) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let (key, raw) = line
            .split_once('=')
            .ok_or_else(|| format!("{}: missing '=' in assignment", index + 1))?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(format!("{}: invalid variable name '{}'", index + 1, key));
        }
        let value = parse_value(raw.trim()).map_err(|e| format!("{}: {}", index + 1, e))?;
        out.push((key.to_string(), value));
    }
    Ok(out)
}

fn parse_value(raw: &str) -> Result<String, String> {
    let quote = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => {
            // unquoted: an inline comment ends the value
            let value = raw.split('#').next().unwrap_or_default();
            return Ok(value.trim_end().to_string());
        }
    };

    let mut value = String::new();
    let mut chars = raw[1..].chars();
    while let Some(ch) = chars.next() {
        match ch {
            c if c == quote => {
                let rest = chars.as_str().trim();
                return if rest.is_empty() || rest.starts_with('#') {
                    Ok(value)
                } else {
                    Err("unexpected characters after closing quote".to_string())
                };
            }
            '\\' if quote == '"' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('r') => value.push('\r'),
                Some('t') => value.push('\t'),
                Some(other) => value.push(other),
                None => return Err("unterminated escape sequence".to_string()),
            },
            other => value.push(other),
        }
    }
    Err("unterminated quoted value".to_string())
}
