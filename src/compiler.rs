//! Expression tree → render closures.
//!
//! The tree is walked once. Every node becomes a boxed closure; nothing is
//! parsed or classified again when the result runs.

use crate::ast::{Expr, Path};
use crate::config::Configuration;
use crate::context::{is_defined_truthy, is_truthy, to_output, Frame, Iteration};
use crate::error::{Error, Result};
use crate::helpers::{BlockBody, Emit};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Argument evaluation. `None` is undefined.
type Eval = dyn Fn(&Frame<'_>) -> Option<Value> + Send + Sync;

fn emit<F>(f: F) -> Box<Emit>
where
    F: Fn(&mut dyn fmt::Write, &Frame<'_>, &Configuration) -> Result<()> + Send + Sync + 'static,
{
    Box::new(f)
}

fn eval<F>(f: F) -> Box<Eval>
where
    F: Fn(&Frame<'_>) -> Option<Value> + Send + Sync + 'static,
{
    Box::new(f)
}

pub fn compile(template: &[Expr]) -> Result<Arc<Emit>> {
    Ok(Arc::from(compile_sequence(template)?))
}

fn compile_sequence(exprs: &[Expr]) -> Result<Box<Emit>> {
    let mut parts = exprs
        .iter()
        .map(compile_expr)
        .collect::<Result<Vec<_>>>()?;

    if parts.len() == 1 {
        if let Some(part) = parts.pop() {
            return Ok(part);
        }
    }

    Ok(emit(move |out, frame, config| {
        for part in &parts {
            part(out, frame, config)?;
        }
        Ok(())
    }))
}

fn compile_optional(exprs: Option<&[Expr]>) -> Result<Option<Box<Emit>>> {
    exprs.map(compile_sequence).transpose()
}

fn compile_expr(expr: &Expr) -> Result<Box<Emit>> {
    match expr {
        Expr::Static(text) => {
            let text = text.clone();
            Ok(emit(move |out, _, _| {
                out.write_str(&text)?;
                Ok(())
            }))
        }
        Expr::Path(path) => {
            let path = path.clone();
            Ok(emit(move |out, frame, _| {
                if let Some(value) = frame.lookup(&path) {
                    out.write_str(&to_output(&value))?;
                }
                Ok(())
            }))
        }
        Expr::Boolish(_) => {
            let condition = compile_value(expr)?;
            Ok(emit(move |out, frame, _| {
                let value = condition(frame).unwrap_or(Value::Null);
                out.write_str(&to_output(&value))?;
                Ok(())
            }))
        }
        Expr::Helper { name, args } => compile_helper(name, args),
        Expr::Block {
            name,
            args,
            body,
            else_body,
        } => compile_block(name, args, body, else_body.as_deref()),
        Expr::Section {
            path,
            body,
            else_body,
        } => compile_section(path, body, else_body.as_deref()),
        Expr::Partial { name, context } => compile_partial(name, context.as_deref()),
    }
}

/// Compile an expression in argument position.
fn compile_value(expr: &Expr) -> Result<Box<Eval>> {
    match expr {
        Expr::Static(text) => {
            let value = Value::String(text.clone());
            Ok(eval(move |_| Some(value.clone())))
        }
        Expr::Path(path) => {
            let path = path.clone();
            Ok(eval(move |frame| frame.lookup(&path)))
        }
        Expr::Boolish(condition) => {
            let condition = compile_value(condition)?;
            Ok(eval(move |frame| {
                Some(Value::Bool(is_defined_truthy(condition(frame).as_ref())))
            }))
        }
        other => Err(Error::syntax(format!(
            "only literals and paths can be helper arguments, found {other:?}"
        ))),
    }
}

fn compile_args(args: &[Expr]) -> Result<Vec<Box<Eval>>> {
    args.iter().map(compile_value).collect()
}

/// Evaluate left to right; undefined becomes `null`.
fn evaluate(args: &[Box<Eval>], frame: &Frame<'_>) -> Vec<Value> {
    args.iter()
        .map(|arg| arg(frame).unwrap_or(Value::Null))
        .collect()
}

fn no_inline_helper(name: &str, config: &Configuration) -> Error {
    if config.has_block_helper(name) {
        Error::helper(
            name,
            format!("no inline helper named `{name}`, it is only registered as a block helper"),
        )
    } else {
        Error::MissingHelper {
            name: name.to_string(),
        }
    }
}

fn no_block_helper(name: &str, config: &Configuration) -> Error {
    if config.has_helper(name) {
        Error::helper(
            name,
            format!("no block helper named `{name}`, it is only registered as an inline helper"),
        )
    } else {
        Error::MissingHelper {
            name: name.to_string(),
        }
    }
}

fn compile_helper(name: &str, args: &[Expr]) -> Result<Box<Emit>> {
    let name = name.to_string();
    let args = compile_args(args)?;
    Ok(emit(move |out, frame, config| {
        let helper = config
            .helper(&name)
            .ok_or_else(|| no_inline_helper(&name, config))?;
        let values = evaluate(&args, frame);
        helper(out, frame, &values)
    }))
}

fn compile_block(
    name: &str,
    args: &[Expr],
    body: &[Expr],
    else_body: Option<&[Expr]>,
) -> Result<Box<Emit>> {
    let name = name.to_string();
    let args = compile_args(args)?;
    let body = compile_sequence(body)?;
    let inverse = compile_optional(else_body)?;
    Ok(emit(move |out, frame, config| {
        let helper = config
            .block_helper(&name)
            .ok_or_else(|| no_block_helper(&name, config))?;
        let values = evaluate(&args, frame);
        let body = BlockBody::new(&*body, frame, config);
        let inverse = inverse
            .as_deref()
            .map(|inverse| BlockBody::new(inverse, frame, config));
        helper(out, frame, &values, &body, inverse.as_ref())
    }))
}

fn compile_section(
    path: &Path,
    body: &[Expr],
    else_body: Option<&[Expr]>,
) -> Result<Box<Emit>> {
    let path = path.clone();
    let body = compile_sequence(body)?;
    let inverse = compile_optional(else_body)?;
    Ok(emit(move |out, frame, config| match frame.lookup(&path) {
        Some(Value::Array(items)) if !items.is_empty() => {
            let len = items.len();
            for (index, item) in items.into_iter().enumerate() {
                let child = frame.iteration_child(item, Iteration::new(index, len));
                body(out, &child, config)?;
            }
            Ok(())
        }
        Some(value) if is_truthy(&value) => {
            let child = frame.child(value);
            body(out, &child, config)
        }
        _ => match &inverse {
            Some(inverse) => inverse(out, frame, config),
            None => Ok(()),
        },
    }))
}

fn compile_partial(name: &str, context: Option<&Expr>) -> Result<Box<Emit>> {
    let name = name.to_string();
    let context = context.map(compile_value).transpose()?;
    Ok(emit(move |out, frame, config| {
        let partial = config
            .partial(&name)
            .ok_or_else(|| Error::MissingPartial { name: name.clone() })?;
        match &context {
            Some(context) => {
                let child = frame.child(context(frame).unwrap_or(Value::Null));
                partial(out, &child, config)
            }
            None => partial(out, frame, config),
        }
    }))
}
