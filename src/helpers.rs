//! Helper calling conventions and the built-in helpers.

use crate::config::Configuration;
use crate::context::{is_truthy, to_output, Frame, Iteration};
use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;

/// Compiled template code: writes to the sink against a frame.
pub(crate) type Emit =
    dyn Fn(&mut dyn fmt::Write, &Frame<'_>, &Configuration) -> Result<()> + Send + Sync;

/// Inline helper: `{{name arg1 arg2}}`. Whatever it writes is the output.
pub type HelperFn = dyn Fn(&mut dyn fmt::Write, &Frame<'_>, &[Value]) -> Result<()> + Send + Sync;

/// Block helper: `{{#name args}}body{{else}}inverse{{/name}}`.
///
/// The helper decides whether, how often, and against which context the
/// body and the inverse are rendered.
pub type BlockHelperFn = dyn Fn(
        &mut dyn fmt::Write,
        &Frame<'_>,
        &[Value],
        &BlockBody<'_>,
        Option<&BlockBody<'_>>,
    ) -> Result<()>
    + Send
    + Sync;

/// A compiled block body bound to the frame the block was entered from.
pub struct BlockBody<'r> {
    emit: &'r Emit,
    frame: &'r Frame<'r>,
    config: &'r Configuration,
}

impl<'r> BlockBody<'r> {
    pub(crate) fn new(emit: &'r Emit, frame: &'r Frame<'r>, config: &'r Configuration) -> Self {
        Self { emit, frame, config }
    }

    /// Render against a new frame holding `value`, whose parent is the block's frame.
    pub fn render(&self, out: &mut dyn fmt::Write, value: Value) -> Result<()> {
        let frame = self.frame.child(value);
        (self.emit)(out, &frame, self.config)
    }

    /// Like [`render`](Self::render), also exposing `@index`, `@first`, `@last` and `@key`.
    pub fn render_iteration(
        &self,
        out: &mut dyn fmt::Write,
        value: Value,
        iteration: Iteration,
    ) -> Result<()> {
        let frame = self.frame.iteration_child(value, iteration);
        (self.emit)(out, &frame, self.config)
    }

    /// Render in the block's own frame, without changing context.
    pub fn render_current(&self, out: &mut dyn fmt::Write) -> Result<()> {
        (self.emit)(out, self.frame, self.config)
    }
}

fn single_arg<'v>(name: &str, args: &'v [Value]) -> Result<&'v Value> {
    match args {
        [arg] => Ok(arg),
        _ => Err(Error::helper(
            name,
            format!("expects exactly one argument, got {}", args.len()),
        )),
    }
}

fn render_inverse(out: &mut dyn fmt::Write, inverse: Option<&BlockBody<'_>>) -> Result<()> {
    match inverse {
        Some(inverse) => inverse.render_current(out),
        None => Ok(()),
    }
}

fn if_helper(
    out: &mut dyn fmt::Write,
    _frame: &Frame<'_>,
    args: &[Value],
    body: &BlockBody<'_>,
    inverse: Option<&BlockBody<'_>>,
) -> Result<()> {
    if is_truthy(single_arg("if", args)?) {
        body.render_current(out)
    } else {
        render_inverse(out, inverse)
    }
}

fn unless_helper(
    out: &mut dyn fmt::Write,
    _frame: &Frame<'_>,
    args: &[Value],
    body: &BlockBody<'_>,
    inverse: Option<&BlockBody<'_>>,
) -> Result<()> {
    if is_truthy(single_arg("unless", args)?) {
        render_inverse(out, inverse)
    } else {
        body.render_current(out)
    }
}

fn with_helper(
    out: &mut dyn fmt::Write,
    _frame: &Frame<'_>,
    args: &[Value],
    body: &BlockBody<'_>,
    inverse: Option<&BlockBody<'_>>,
) -> Result<()> {
    let target = single_arg("with", args)?;
    if is_truthy(target) {
        body.render(out, target.clone())
    } else {
        render_inverse(out, inverse)
    }
}

fn each_helper(
    out: &mut dyn fmt::Write,
    _frame: &Frame<'_>,
    args: &[Value],
    body: &BlockBody<'_>,
    inverse: Option<&BlockBody<'_>>,
) -> Result<()> {
    match single_arg("each", args)? {
        Value::Array(items) if !items.is_empty() => {
            let len = items.len();
            for (index, item) in items.iter().enumerate() {
                body.render_iteration(out, item.clone(), Iteration::new(index, len))?;
            }
            Ok(())
        }
        Value::Object(map) if !map.is_empty() => {
            let len = map.len();
            for (index, (key, item)) in map.iter().enumerate() {
                let iteration = Iteration::new(index, len).with_key(key.as_str());
                body.render_iteration(out, item.clone(), iteration)?;
            }
            Ok(())
        }
        _ => render_inverse(out, inverse),
    }
}

fn log_helper(_out: &mut dyn fmt::Write, _frame: &Frame<'_>, args: &[Value]) -> Result<()> {
    let message = args
        .iter()
        .map(|arg| to_output(arg).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    tracing::info!(target: "shimmybars::template", "{}", message);
    Ok(())
}

pub(crate) fn register_builtins(config: &Configuration) {
    config.register_block_helper("if", if_helper);
    config.register_block_helper("unless", unless_helper);
    config.register_block_helper("with", with_helper);
    config.register_block_helper("each", each_helper);
    config.register_helper("log", log_helper);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Path;
    use serde_json::json;

    fn echo_body(out: &mut dyn fmt::Write, frame: &Frame<'_>, _: &Configuration) -> Result<()> {
        let value = frame.lookup(&Path::parse("this")).unwrap_or(Value::Null);
        out.write_str(&to_output(&value))?;
        if let Some(it) = frame.iteration() {
            write!(out, "#{}", it.index)?;
        }
        out.write_str(";")?;
        Ok(())
    }

    fn inverse_body(out: &mut dyn fmt::Write, _: &Frame<'_>, _: &Configuration) -> Result<()> {
        out.write_str("inverse")?;
        Ok(())
    }

    type BlockFnPtr = fn(
        &mut dyn fmt::Write,
        &Frame<'_>,
        &[Value],
        &BlockBody<'_>,
        Option<&BlockBody<'_>>,
    ) -> Result<()>;

    fn run_block(helper: BlockFnPtr, args: &[Value]) -> Result<String> {
        let config = Configuration::new();
        let data = json!("outer");
        let frame = Frame::root(&data);
        let body = BlockBody::new(&echo_body, &frame, &config);
        let inverse = BlockBody::new(&inverse_body, &frame, &config);
        let mut out = String::new();
        helper(&mut out, &frame, args, &body, Some(&inverse))?;
        Ok(out)
    }

    #[test]
    fn if_keeps_the_current_frame() {
        assert_eq!(run_block(if_helper, &[json!(true)]).unwrap(), "outer;");
        assert_eq!(run_block(if_helper, &[json!(false)]).unwrap(), "inverse");
        assert_eq!(run_block(unless_helper, &[json!(false)]).unwrap(), "outer;");
        assert_eq!(run_block(unless_helper, &[json!(true)]).unwrap(), "inverse");
    }

    #[test]
    fn with_pushes_the_target() {
        assert_eq!(run_block(with_helper, &[json!("inner")]).unwrap(), "inner;");
        assert_eq!(run_block(with_helper, &[json!(null)]).unwrap(), "inverse");
    }

    #[test]
    fn each_iterates_arrays_and_objects() {
        assert_eq!(run_block(each_helper, &[json!(["a", "b"])]).unwrap(), "a#0;b#1;");
        assert_eq!(run_block(each_helper, &[json!({"k": "v"})]).unwrap(), "v#0;");
        assert_eq!(run_block(each_helper, &[json!([])]).unwrap(), "inverse");
    }

    #[test]
    fn wrong_arity_is_a_helper_error() {
        let err = run_block(if_helper, &[]).unwrap_err();
        assert!(matches!(err, Error::Helper { ref name, .. } if name == "if"));
    }
}
