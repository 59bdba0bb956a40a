//! shimmybars: a small Handlebars-style template compiler.
//!
//! A template is compiled once into a [`Renderer`] and then rendered against
//! any number of data contexts, from any number of threads. All parsing and
//! classification happens in [`Handlebars::compile`]; rendering only walks
//! prebuilt closures.
//!
//! Supported subset:
//! - Literal text and `{{path}}` output (`a.b.c`, `this`, `.`, `../x`,
//!   `@root.x`, `@index`, `@first`, `@last`, `@key`).
//! - Inline helpers `{{name arg "literal"}}` and block helpers
//!   `{{#name arg}}...{{else}}...{{/name}}`.
//! - Built-in blocks `if`, `unless`, `each`, `with`, plus the `log` helper.
//! - Sections `{{#name}}...{{/name}}` and inverted sections
//!   `{{^name}}...{{/name}}` for names that are not helpers.
//! - Partials `{{> name}}` / `{{> name context}}`, resolved when rendered.
//! - Comments `{{! ... }}` and `{{!-- ... --}}`.
//! - Standalone block, comment and partial tags take their line with them.
//!
//! Not supported:
//! - HTML escaping and triple-stash `{{{raw}}}`. Output is written as is.
//! - Subexpressions, hash arguments, `{{else if}}` chains.
//! - Whitespace control (`{{~`).
//!
//! Rendering rules:
//! - Missing values render as the empty string and are falsy.
//! - `null`, `false`, `""`, `[]` and `{}` are falsy; everything else,
//!   including `0`, is truthy.
//! - Calling a helper or partial that is not registered when the template
//!   renders is an error.
//!
//! ```
//! use serde_json::json;
//! use shimmybars::Handlebars;
//!
//! let handlebars = Handlebars::new();
//! let template = handlebars
//!     .compile("{{#each people}}{{#if @first}}{{else}}, {{/if}}{{name}}{{/each}}")
//!     .unwrap();
//! let out = template
//!     .render(&json!({"people": [{"name": "Ann"}, {"name": "Bo"}]}))
//!     .unwrap();
//! assert_eq!(out, "Ann, Bo");
//! ```

pub mod adapter;
pub mod ast;
mod compiler;
pub mod config;
pub mod context;
mod converter;
pub mod error;
pub mod helpers;
pub mod lexer;

pub use adapter::{ContextAdapter, MergedContext};
pub use config::Configuration;
pub use context::{is_truthy, Frame, Iteration};
pub use error::{Error, Result};
pub use helpers::{BlockBody, BlockHelperFn, HelperFn};
pub use serde_json::Value;

use helpers::Emit;
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// A compiled template.
///
/// Cheap to clone; clones share the compiled code and the configuration.
#[derive(Clone)]
pub struct Renderer {
    emit: Arc<Emit>,
    config: Arc<Configuration>,
}

impl Renderer {
    /// Render `data` to a new string.
    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let mut out = String::new();
        self.render_to(&mut out, data)?;
        Ok(out)
    }

    /// Render `data` into an existing sink.
    pub fn render_to<W, T>(&self, out: &mut W, data: &T) -> Result<()>
    where
        W: fmt::Write,
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(data)?;
        self.write_value(out, &value)
    }

    /// Render an already-built JSON value without converting it.
    pub fn render_value(&self, value: &Value) -> Result<String> {
        let mut out = String::new();
        self.write_value(&mut out, value)?;
        Ok(out)
    }

    fn write_value(&self, out: &mut dyn fmt::Write, value: &Value) -> Result<()> {
        let frame = Frame::root(value);
        (self.emit)(out, &frame, self.config.as_ref())
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer").finish_non_exhaustive()
    }
}

/// Compiles templates and owns the helper and partial registries they use.
///
/// Registration takes `&self`, so one `Handlebars` can be shared between
/// threads that compile, register and render at the same time.
#[derive(Debug, Clone)]
pub struct Handlebars {
    config: Arc<Configuration>,
}

impl Default for Handlebars {
    fn default() -> Self {
        Self::new()
    }
}

impl Handlebars {
    /// A new environment with the built-in helpers registered.
    pub fn new() -> Self {
        Self::with_configuration(Arc::new(Configuration::with_builtins()))
    }

    /// An environment over existing registries, which may be shared.
    pub fn with_configuration(config: Arc<Configuration>) -> Self {
        Self { config }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Compile a template. Lexing, block pairing and every other structural
    /// check happen here, never on first render.
    pub fn compile(&self, template: &str) -> Result<Renderer> {
        let tokens = lexer::tokenize(template)?;
        let tree = converter::convert(tokens, &self.config)?;
        let emit = compiler::compile(&tree)?;
        tracing::debug!(bytes = template.len(), nodes = tree.len(), "compiled template");
        Ok(Renderer {
            emit,
            config: Arc::clone(&self.config),
        })
    }

    /// Compile a template read to the end from `reader`.
    pub fn compile_reader<R: Read>(&self, mut reader: R) -> Result<Renderer> {
        let mut template = String::new();
        reader.read_to_string(&mut template)?;
        self.compile(&template)
    }

    pub fn register_helper<F>(&self, name: impl Into<String>, helper: F)
    where
        F: Fn(&mut dyn fmt::Write, &Frame<'_>, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.config.register_helper(name, helper);
    }

    pub fn register_block_helper<F>(&self, name: impl Into<String>, helper: F)
    where
        F: Fn(
                &mut dyn fmt::Write,
                &Frame<'_>,
                &[Value],
                &BlockBody<'_>,
                Option<&BlockBody<'_>>,
            ) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.config.register_block_helper(name, helper);
    }

    /// Make `template` available as the partial `{{> name}}`.
    ///
    /// Templates already compiled pick it up on their next render. The
    /// partial renders with the registries of whichever template invokes it.
    pub fn register_template(&self, name: impl Into<String>, template: &Renderer) {
        self.config.register_partial(name, Arc::clone(&template.emit));
    }

    /// Compile `source` and register it as the partial `name`.
    pub fn register_template_source(&self, name: impl Into<String>, source: &str) -> Result<()> {
        let template = self.compile(source)?;
        self.register_template(name, &template);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_interpolation() {
        let handlebars = Handlebars::new();
        let template = handlebars.compile("Hello, {{name}}!").unwrap();
        assert_eq!(template.render(&json!({"name": "world"})).unwrap(), "Hello, world!");
    }

    #[test]
    fn template_without_tags_is_literal() {
        let handlebars = Handlebars::new();
        let template = handlebars.compile("no tags\nat all\n").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "no tags\nat all\n");
    }

    #[test]
    fn renders_serializable_structs() {
        #[derive(Serialize)]
        struct Person {
            name: &'static str,
            age: u32,
        }

        let handlebars = Handlebars::new();
        let template = handlebars.compile("{{name}} is {{age}}").unwrap();
        let out = template.render(&Person { name: "Ann", age: 0 }).unwrap();
        assert_eq!(out, "Ann is 0");
    }

    #[test]
    fn render_to_appends_to_sink() {
        let handlebars = Handlebars::new();
        let template = handlebars.compile("[{{x}}]").unwrap();
        let mut out = String::from("prefix");
        template.render_to(&mut out, &json!({"x": 1})).unwrap();
        assert_eq!(out, "prefix[1]");
    }

    #[test]
    fn compile_reader_reads_everything() {
        let handlebars = Handlebars::new();
        let template = handlebars.compile_reader("{{a}}-{{b}}".as_bytes()).unwrap();
        assert_eq!(template.render_value(&json!({"a": 1, "b": 2})).unwrap(), "1-2");
    }

    #[test]
    fn compile_errors_are_eager() {
        let handlebars = Handlebars::new();
        assert!(matches!(handlebars.compile("{{oops"), Err(Error::Lex { .. })));
        assert!(matches!(
            handlebars.compile("{{#if x}}open"),
            Err(Error::BlockMismatch { .. })
        ));
    }

    #[test]
    fn environments_can_share_a_configuration() {
        let first = Handlebars::new();
        let second = Handlebars::with_configuration(Arc::clone(first.configuration()));
        second.register_template_source("p", "shared").unwrap();
        let template = first.compile("{{> p}}").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "shared");
    }
}
