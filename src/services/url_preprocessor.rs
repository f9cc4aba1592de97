//! URL Preprocessor: compiles the user's normalization script.
//!
//! Scripts are Rhai expressions with a single free variable, `$url`, holding
//! the page URL. The value of the last expression must be a string. The
//! sandbox exposes no I/O; a per-evaluation operation budget bounds runaway
//! scripts. Helper functions for common URL surgery are registered on the
//! engine.

use std::fmt;
use std::sync::Arc;

use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use tracing::{debug, warn};
use url::Url;

use crate::config::{HostConfig, DEFAULT_MAX_SCRIPT_OPERATIONS};
use crate::types::errors::PreprocessorError;
use crate::types::read_page::{DEFAULT_URL_PREPROCESSOR, URL_PREPROCESSOR_ARGUMENT_NAME};

/// URL every script is evaluated against once at compile time.
pub const PROBE_URL: &str = "https://www.test.com/page?q=123#section";

/// Variable name the argument is bound to inside the engine.
const SCOPE_ARGUMENT_NAME: &str = "url";

#[derive(Debug, Clone)]
pub struct PreprocessorConfig {
    pub max_operations: u64,
    pub max_string_size: usize,
    pub max_call_levels: usize,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_SCRIPT_OPERATIONS,
            max_string_size: 1_000_000,
            max_call_levels: 64,
        }
    }
}

impl From<&HostConfig> for PreprocessorConfig {
    fn from(config: &HostConfig) -> Self {
        Self {
            max_operations: config.max_script_operations,
            ..Self::default()
        }
    }
}

/// Trait defining the preprocessor compiler interface.
pub trait UrlPreprocessorTrait {
    fn compile(&self, source: &str) -> Result<UrlTransform, PreprocessorError>;
    fn default_transform(&self) -> Result<UrlTransform, PreprocessorError>;
}

/// Builds sandboxed engines and compiles scripts into [`UrlTransform`]s.
#[derive(Clone)]
pub struct UrlPreprocessor {
    engine: Arc<Engine>,
}

/// A compiled, validated preprocessor. Cheap to clone.
#[derive(Clone)]
pub struct UrlTransform {
    engine: Arc<Engine>,
    ast: AST,
}

impl fmt::Debug for UrlTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlTransform").finish_non_exhaustive()
    }
}

impl UrlPreprocessor {
    pub fn new(config: PreprocessorConfig) -> Self {
        Self {
            engine: Arc::new(create_engine(&config)),
        }
    }

    /// Compiles and validates an arbitrary source string for one-off testing.
    pub fn test(&self, source: &str, url: &str) -> Result<String, PreprocessorError> {
        self.compile(source)?.apply(url)
    }
}

impl Default for UrlPreprocessor {
    fn default() -> Self {
        Self::new(PreprocessorConfig::default())
    }
}

impl UrlPreprocessorTrait for UrlPreprocessor {
    /// Parses `source` and evaluates it once against [`PROBE_URL`].
    ///
    /// A script that does not parse, fails on the probe, or returns anything
    /// but a string is rejected.
    fn compile(&self, source: &str) -> Result<UrlTransform, PreprocessorError> {
        let script = bind_argument(source);
        let ast = self
            .engine
            .compile(&script)
            .map_err(|e| PreprocessorError::Compile(e.to_string()))?;

        let transform = UrlTransform {
            engine: Arc::clone(&self.engine),
            ast,
        };
        let probed = transform.apply(PROBE_URL)?;
        debug!(probe = PROBE_URL, result = %probed, "url preprocessor compiled");
        Ok(transform)
    }

    fn default_transform(&self) -> Result<UrlTransform, PreprocessorError> {
        self.compile(DEFAULT_URL_PREPROCESSOR)
    }
}

impl UrlTransform {
    /// Runs the script on `url` and returns the normalized form.
    pub fn apply(&self, url: &str) -> Result<String, PreprocessorError> {
        let mut scope = Scope::new();
        scope.push(SCOPE_ARGUMENT_NAME, url.to_string());

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|e| {
                if let EvalAltResult::ErrorTooManyOperations(_) = *e {
                    warn!(url, "url preprocessor exceeded its operation budget");
                }
                PreprocessorError::Evaluation(e.to_string())
            })?;

        if !value.is_string() {
            return Err(PreprocessorError::InvalidReturn(value.type_name().to_string()));
        }
        value
            .into_string()
            .map_err(|type_name| PreprocessorError::InvalidReturn(type_name.to_string()))
    }
}

fn create_engine(config: &PreprocessorConfig) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(config.max_operations);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_expr_depths(64, 64);

    engine.on_print(|text| debug!(target: "url_preprocessor", "{}", text));
    engine.on_debug(|text, _source, pos| debug!(target: "url_preprocessor", ?pos, "{}", text));

    engine.register_fn("strip_query", strip_query);
    engine.register_fn("strip_fragment", strip_fragment);
    engine.register_fn("strip_trailing_slash", strip_trailing_slash);
    engine.register_fn("lower_case", |url: &str| url.to_lowercase());
    engine.register_fn("url_host", url_host);
    engine.register_fn("url_path", url_path);
    engine.register_fn("url_origin", url_origin);
    engine.register_fn("is_valid_url", |url: &str| Url::parse(url).is_ok());

    engine
}

/// Rewrites every `$url` token to the engine-side variable name.
///
/// String and character literals and comments are copied unchanged, as is
/// `$url` followed by an identifier character (e.g. `$urls`).
pub fn bind_argument(source: &str) -> String {
    let arg = URL_PREPROCESSOR_ARGUMENT_NAME;
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(c) = rest.chars().next() {
        let len = match c {
            '"' | '\'' | '`' => literal_len(rest, c),
            '/' if rest.starts_with("//") => rest.find('\n').unwrap_or(rest.len()),
            '/' if rest.starts_with("/*") => block_comment_len(rest),
            '$' if rest.starts_with(arg) => {
                let continues = rest[arg.len()..]
                    .chars()
                    .next()
                    .map(|c| c.is_alphanumeric() || c == '_')
                    .unwrap_or(false);
                if !continues {
                    out.push_str(SCOPE_ARGUMENT_NAME);
                    rest = &rest[arg.len()..];
                    continue;
                }
                arg.len()
            }
            _ => c.len_utf8(),
        };
        out.push_str(&rest[..len]);
        rest = &rest[len..];
    }
    out
}

/// Byte length of the literal opening `text`, closing quote included.
/// An unterminated literal runs to the end.
fn literal_len(text: &str, quote: char) -> usize {
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' && quote != '`' {
            escaped = true;
        } else if c == quote {
            return i + c.len_utf8();
        }
    }
    text.len()
}

/// Byte length of the block comment opening `text`. Block comments nest.
fn block_comment_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    text.len()
}

// === Registered helpers ===
// Unparsable input passes through unchanged.

fn strip_query(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn strip_fragment(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn strip_trailing_slash(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

fn url_host(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

fn url_path(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn url_origin(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|_| url.to_string())
}
