// afx-core/src/template.rs
//! A small `{{ }}` template language for release asset names.
//!
//! Actions are pipelines of commands separated by `|`. A command is either a
//! single operand (`.Release.Tag`, `"text"`, `` `raw` ``, a parenthesised
//! pipeline) or a function name followed by operands. The value flowing out of
//! one stage of a pipeline is passed as the last argument of the next.
//! Every value is a string; unknown fields and unknown functions are errors.
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use afx_common::error::{AfxError, Result};
use afx_common::Package;
use tracing::debug;

/// Operating system name in the conventions release artefacts use.
pub fn current_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// CPU architecture name in the conventions release artefacts use.
pub fn current_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseData {
    pub name: String,
    pub tag: String,
}

/// Values templates can refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateData {
    pub env: BTreeMap<String, String>,
    pub os: String,
    pub arch: String,
    pub name: String,
    pub home: String,
    pub release: ReleaseData,
}

impl TemplateData {
    /// Data for `pkg` on the running host, with the process environment.
    pub fn for_package(pkg: &Package) -> Self {
        let release = pkg
            .release()
            .map(|r| ReleaseData {
                name: r.name.clone(),
                tag: r.tag.clone(),
            })
            .unwrap_or_default();
        Self {
            env: std::env::vars().collect(),
            os: current_os().to_string(),
            arch: current_arch().to_string(),
            name: pkg.name().to_string(),
            home: pkg.home().to_string_lossy().to_string(),
            release,
        }
    }

    /// Rewrites `OS` and `Arch` when a replacement key equals their value.
    pub fn replace(&mut self, replacements: &BTreeMap<String, String>) {
        for (from, to) in replacements {
            if self.os == *from {
                self.os = to.clone();
            }
            if self.arch == *from {
                self.arch = to.clone();
            }
        }
    }

    fn lookup(&self, path: &[String]) -> Result<String> {
        let missing = || AfxError::Template(format!("no such key: .{}", path.join(".")));
        let parts: Vec<&str> = path.iter().map(String::as_str).collect();
        match parts.as_slice() {
            ["OS"] => Ok(self.os.clone()),
            ["Arch"] => Ok(self.arch.clone()),
            ["Name"] => Ok(self.name.clone()),
            ["Home"] | ["Dir"] => Ok(self.home.clone()),
            ["Release", "Name"] => Ok(self.release.name.clone()),
            ["Release", "Tag"] => Ok(self.release.tag.clone()),
            ["Env", key] => self.env.get(*key).cloned().ok_or_else(missing),
            _ => Err(missing()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Field(Vec<String>),
    Str(String),
    Ident(String),
    Pipe,
    LParen,
    RParen,
}

fn tokenize(action: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = action.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(AfxError::Template(
                                "unterminated quoted string".to_string(),
                            ))
                        }
                        Some('"') => break,
                        Some('\\') => {
                            let escaped = chars.get(i + 1).ok_or_else(|| {
                                AfxError::Template("unterminated quoted string".to_string())
                            })?;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(other) => {
                            value.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
                i += 1;
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == '`')
                    .map(|p| start + p)
                    .ok_or_else(|| AfxError::Template("unterminated raw string".to_string()))?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '.' => {
                let start = i;
                i += 1;
                while i < chars.len() && is_field_char(chars[i]) {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let path: Vec<String> = raw[1..].split('.').map(str::to_string).collect();
                if path.iter().any(String::is_empty) {
                    return Err(AfxError::Template(format!("bad field reference '{raw}'")));
                }
                tokens.push(Token::Field(path));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(AfxError::Template(format!(
                    "unexpected character '{other}' in action"
                )))
            }
        }
    }
    Ok(tokens)
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

struct Evaluator<'a> {
    tokens: &'a [Token],
    pos: usize,
    data: &'a TemplateData,
}

impl Evaluator<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn pipeline(&mut self) -> Result<String> {
        let mut value = self.command(None)?;
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            value = self.command(Some(value))?;
        }
        Ok(value)
    }

    fn command(&mut self, piped: Option<String>) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                let mut args = Vec::new();
                while let Some(arg) = self.operand()? {
                    args.push(arg);
                }
                args.extend(piped);
                call(&name, &args)
            }
            Some(_) => {
                let value = self
                    .operand()?
                    .ok_or_else(|| AfxError::Template("missing value in command".to_string()))?;
                if piped.is_some() {
                    return Err(AfxError::Template(
                        "cannot pipe into a non-function value".to_string(),
                    ));
                }
                if let Some(Token::Field(_) | Token::Str(_) | Token::Ident(_) | Token::LParen) =
                    self.peek()
                {
                    return Err(AfxError::Template(
                        "can't give argument to non-function".to_string(),
                    ));
                }
                Ok(value)
            }
            None => Err(AfxError::Template("missing value in command".to_string())),
        }
    }

    fn operand(&mut self) -> Result<Option<String>> {
        match self.peek().cloned() {
            Some(Token::Field(path)) => {
                self.pos += 1;
                self.data.lookup(&path).map(Some)
            }
            Some(Token::Str(value)) => {
                self.pos += 1;
                Ok(Some(value))
            }
            Some(Token::Ident(name)) => {
                // A bare function name used as an argument is called with no arguments.
                self.pos += 1;
                call(&name, &[]).map(Some)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.pipeline()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(AfxError::Template("unclosed left paren".to_string()));
                }
                self.pos += 1;
                Ok(Some(value))
            }
            Some(Token::Pipe) | Some(Token::RParen) | None => Ok(None),
        }
    }
}

fn arity(name: &str, args: &[String], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(AfxError::Template(format!(
            "wrong number of args for {name}: want {expected} got {}",
            args.len()
        )));
    }
    Ok(())
}

fn call(name: &str, args: &[String]) -> Result<String> {
    match name {
        "replace" => {
            arity(name, args, 3)?;
            Ok(args[2].replace(&args[0], &args[1]))
        }
        "tolower" => {
            arity(name, args, 1)?;
            Ok(args[0].to_lowercase())
        }
        "toupper" => {
            arity(name, args, 1)?;
            Ok(args[0].to_uppercase())
        }
        "trim" => {
            arity(name, args, 1)?;
            Ok(args[0].trim().to_string())
        }
        "trimprefix" => {
            arity(name, args, 2)?;
            Ok(args[1]
                .strip_prefix(args[0].as_str())
                .unwrap_or(&args[1])
                .to_string())
        }
        "trimsuffix" => {
            arity(name, args, 2)?;
            Ok(args[1]
                .strip_suffix(args[0].as_str())
                .unwrap_or(&args[1])
                .to_string())
        }
        "dir" => {
            arity(name, args, 1)?;
            Ok(match Path::new(&args[0]).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    parent.to_string_lossy().to_string()
                }
                Some(_) => ".".to_string(),
                None => args[0].clone(),
            })
        }
        "abs" => {
            arity(name, args, 1)?;
            let path = Path::new(&args[0]);
            if path.is_absolute() {
                return Ok(args[0].clone());
            }
            let cwd = std::env::current_dir()?;
            Ok(cwd.join(path).to_string_lossy().to_string())
        }
        "time" => {
            arity(name, args, 1)?;
            let mut out = String::new();
            write!(out, "{}", chrono::Utc::now().format(&args[0]))
                .map_err(|_| AfxError::Template(format!("invalid time format '{}'", args[0])))?;
            Ok(out)
        }
        other => Err(AfxError::Template(format!(
            "function \"{other}\" not defined"
        ))),
    }
}

/// Renders `template` against `data`.
pub fn render(template: &str, data: &TemplateData) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let mut text = &rest[..start];
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| AfxError::Template(format!("unclosed action in '{template}'")))?;
        let mut action = &after[..end];
        rest = &after[end + 2..];

        if let Some(stripped) = action.strip_prefix("- ") {
            text = text.trim_end();
            action = stripped;
        }
        if let Some(stripped) = action.strip_suffix(" -") {
            action = stripped;
            rest = rest.trim_start();
        }
        out.push_str(text);

        let tokens = tokenize(action)?;
        if tokens.is_empty() {
            return Err(AfxError::Template("missing value for command".to_string()));
        }
        let mut evaluator = Evaluator {
            tokens: &tokens,
            pos: 0,
            data,
        };
        let value = evaluator.pipeline()?;
        if evaluator.pos != tokens.len() {
            return Err(AfxError::Template(format!(
                "unexpected token in action '{}'",
                action.trim()
            )));
        }
        out.push_str(&value);
    }
    out.push_str(rest);
    debug!("Rendered template '{}' to '{}'", template, out);
    Ok(out)
}
