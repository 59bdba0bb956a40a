//! Token stream → expression tree.
//!
//! Conversion is a fixed sequence of small passes. Each pass takes the
//! previous pass's items by value and returns a new list, resolving a bit
//! more of the raw token stream into [`Expr`] nodes. Passes look at most one
//! item ahead, through [`Stream::peek`].
//!
//! Order matters: literals and syntactic paths are resolved before helper
//! names are classified, and helper calls are complete before blocks are
//! paired up.

use crate::ast::{Anchor, Expr, Path, Template};
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::lexer::{Sigil, Token};

/// Names treated as helpers even when nothing is registered under them.
const BUILTIN_HELPERS: &[&str] = &["else", "each"];

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Token(Token),
    Node(Expr),
    /// A classified helper name, still collecting arguments.
    Call {
        name: String,
        sigil: Option<Sigil>,
        args: Vec<Expr>,
    },
    /// `{{#name}}` / `{{^name}}` where `name` is not a helper.
    SectionHead {
        name: String,
        path: Path,
        inverted: bool,
    },
    Open {
        name: String,
        head: Head,
        inverted: bool,
    },
    Else,
    Close(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Head {
    Helper(Vec<Expr>),
    Section(Path),
}

/// Owned items with one item of lookahead.
struct Stream {
    // Reversed, so the next item is at the end.
    items: Vec<Item>,
}

impl Stream {
    fn new(mut items: Vec<Item>) -> Self {
        items.reverse();
        Self { items }
    }

    fn next(&mut self) -> Option<Item> {
        self.items.pop()
    }

    fn peek(&self) -> Option<&Item> {
        self.items.last()
    }
}

pub fn convert(tokens: Vec<Token>, config: &Configuration) -> Result<Template> {
    let items: Vec<Item> = tokens.into_iter().map(Item::Token).collect();

    let items = traced("standalone", standalone(items));
    let items = traced("comments", comments(items));
    let items = traced("literals", literals(items));
    let items = traced("paths", paths(items));
    let items = traced("partials", partials(items)?);
    let items = traced("helpers", helpers(items, config));
    let items = traced("deferred_paths", deferred_paths(items));
    let items = traced("arguments", arguments(items)?);
    let items = traced("expressions", expressions(items)?);
    let template = blocks(items)?;
    Ok(boolish(template))
}

fn traced(stage: &str, items: Vec<Item>) -> Vec<Item> {
    tracing::trace!(stage, items = items.len(), "conversion stage done");
    items
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t' || c == '\r')
}

/// Tags that vanish with their line when they stand alone on it.
fn is_standalone_kind(item: Option<&Item>) -> bool {
    match item {
        Some(Item::Token(Token::Word { value, sigil })) => match sigil {
            Some(
                Sigil::BlockOpen
                | Sigil::BlockClose
                | Sigil::Inverted
                | Sigil::Partial
                | Sigil::Comment,
            ) => true,
            None => value == "else",
            _ => false,
        },
        _ => false,
    }
}

fn text_at(items: &[Item], index: usize) -> Option<&str> {
    match items.get(index) {
        Some(Item::Token(Token::Text(text))) => Some(text),
        _ => None,
    }
}

/// Strip the line of a block, else, comment or partial tag that is alone on it.
fn standalone(mut items: Vec<Item>) -> Vec<Item> {
    let last = items.len().saturating_sub(1);
    let mut trim_tail = vec![false; items.len()];
    let mut trim_head = vec![false; items.len()];

    // Decide on the untouched text first, then apply.
    let mut start = 0;
    while start < items.len() {
        if items[start] != Item::Token(Token::ExprStart) || !is_standalone_kind(items.get(start + 1)) {
            start += 1;
            continue;
        }
        let Some(end) = (start..items.len()).find(|&i| items[i] == Item::Token(Token::ExprEnd)) else {
            break;
        };

        let before_ok = match start.checked_sub(1) {
            None => true,
            Some(prev) => match text_at(&items, prev) {
                Some(text) => match text.rfind('\n') {
                    Some(nl) => is_blank(&text[nl + 1..]),
                    None => prev == 0 && is_blank(text),
                },
                None => false,
            },
        };
        let after_ok = match items.get(end + 1) {
            None => true,
            Some(_) => match text_at(&items, end + 1) {
                Some(text) => match text.find('\n') {
                    Some(nl) => is_blank(&text[..nl]),
                    None => end + 1 == last && is_blank(text),
                },
                None => false,
            },
        };

        if before_ok && after_ok {
            if start > 0 {
                trim_tail[start - 1] = true;
            }
            if end + 1 < items.len() {
                trim_head[end + 1] = true;
            }
        }
        start = end + 1;
    }

    for (index, item) in items.iter_mut().enumerate() {
        if let Item::Token(Token::Text(text)) = item {
            if trim_tail[index] {
                text.truncate(text.rfind('\n').map_or(0, |nl| nl + 1));
            }
            if trim_head[index] {
                match text.find('\n') {
                    Some(nl) => {
                        text.drain(..=nl);
                    }
                    None => text.clear(),
                }
            }
        }
    }

    items.retain(|item| !matches!(item, Item::Token(Token::Text(text)) if text.is_empty()));
    items
}

fn comments(items: Vec<Item>) -> Vec<Item> {
    let mut stream = Stream::new(items);
    let mut out = Vec::new();
    while let Some(item) = stream.next() {
        let is_comment = matches!(
            stream.peek(),
            Some(Item::Token(Token::Word {
                sigil: Some(Sigil::Comment),
                ..
            }))
        );
        if item == Item::Token(Token::ExprStart) && is_comment {
            stream.next();
            // The closing `}}`.
            stream.next();
            continue;
        }
        out.push(item);
    }
    out
}

fn literals(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| match item {
            Item::Token(Token::Text(text)) => Item::Node(Expr::Static(text)),
            Item::Token(Token::StringLiteral(text)) => Item::Node(Expr::Static(text)),
            other => other,
        })
        .collect()
}

/// Words that can only be paths: `../x`, `@index`, `this`, `a.b`.
fn paths(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| match item {
            Item::Token(Token::Word { value, sigil })
                if matches!(sigil, Some(Sigil::Data | Sigil::Parent | Sigil::This))
                    || (sigil.is_none() && value.contains(['.', '/'])) =>
            {
                Item::Node(Expr::Path(Path::parse(&value)))
            }
            other => other,
        })
        .collect()
}

fn partials(items: Vec<Item>) -> Result<Vec<Item>> {
    let mut stream = Stream::new(items);
    let mut out = Vec::new();
    while let Some(item) = stream.next() {
        let name = match item {
            Item::Token(Token::Word {
                value,
                sigil: Some(Sigil::Partial),
            }) => value,
            other => {
                out.push(other);
                continue;
            }
        };
        if name.is_empty() {
            return Err(Error::syntax("partial reference without a name"));
        }

        let context = if matches!(stream.peek(), Some(Item::Token(Token::ExprEnd))) {
            None
        } else {
            match stream.next() {
                Some(Item::Node(expr @ Expr::Path(_))) => Some(Box::new(expr)),
                Some(Item::Token(Token::Word { value, sigil: None })) => {
                    Some(Box::new(Expr::Path(Path::parse(&value))))
                }
                other => {
                    return Err(Error::syntax(format!(
                        "partial `{name}` takes one path as context, found {other:?}"
                    )))
                }
            }
        };
        if !matches!(stream.peek(), Some(Item::Token(Token::ExprEnd))) {
            return Err(Error::syntax(format!(
                "partial `{name}` takes at most one context argument"
            )));
        }
        out.push(Item::Node(Expr::Partial { name, context }));
    }
    Ok(out)
}

/// Helper classification: the word right after `{{` becomes a helper call
/// when its name is registered (inline or block) or is a built-in name.
/// Anything else passes through untouched and is resolved as a path later.
fn helpers(items: Vec<Item>, config: &Configuration) -> Vec<Item> {
    let is_helper_name = |name: &str| {
        config.has_helper(name) || config.has_block_helper(name) || BUILTIN_HELPERS.contains(&name)
    };

    let mut stream = Stream::new(items);
    let mut out = Vec::new();
    while let Some(item) = stream.next() {
        let at_start = item == Item::Token(Token::ExprStart);
        out.push(item);
        if !at_start {
            continue;
        }
        match stream.next() {
            Some(Item::Token(Token::Word { value, sigil }))
                if matches!(sigil, None | Some(Sigil::BlockOpen | Sigil::Inverted))
                    && !value.is_empty()
                    && is_helper_name(&value) =>
            {
                out.push(Item::Call {
                    name: value,
                    sigil,
                    args: Vec::new(),
                });
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Remaining bare words are paths; unclassified block openers become sections.
fn deferred_paths(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| match item {
            Item::Token(Token::Word { value, sigil: None }) => {
                Item::Node(Expr::Path(Path::parse(&value)))
            }
            Item::Token(Token::Word {
                value,
                sigil: Some(sigil @ (Sigil::BlockOpen | Sigil::Inverted)),
            }) if !value.is_empty() => {
                tracing::debug!(name = %value, "block is not a registered helper, resolving it as a path");
                Item::SectionHead {
                    path: Path::parse(&value),
                    name: value,
                    inverted: sigil == Sigil::Inverted,
                }
            }
            other => other,
        })
        .collect()
}

fn take_args(stream: &mut Stream) -> Vec<Expr> {
    let mut args = Vec::new();
    while matches!(stream.peek(), Some(Item::Node(_))) {
        if let Some(Item::Node(expr)) = stream.next() {
            args.push(expr);
        }
    }
    args
}

/// A name that can be looked up as a late-bound helper.
fn bare_name(path: &Path) -> Result<String> {
    match path.segments.as_slice() {
        [name] if path.parent_hops == 0 && path.anchor == Anchor::Current => {
            Ok(name.clone())
        }
        _ => Err(Error::syntax(format!(
            "`{}` cannot be called with arguments",
            path.segments.join(".")
        ))),
    }
}

/// Attach arguments to helper calls. A path followed by arguments is a
/// helper that was not registered at compile time; it binds at render time.
fn arguments(items: Vec<Item>) -> Result<Vec<Item>> {
    let mut stream = Stream::new(items);
    let mut out = Vec::new();
    while let Some(item) = stream.next() {
        let at_start = item == Item::Token(Token::ExprStart);
        out.push(item);
        if !at_start {
            continue;
        }
        let head = match stream.next() {
            Some(Item::Call {
                name,
                sigil,
                mut args,
            }) => {
                args.extend(take_args(&mut stream));
                Item::Call { name, sigil, args }
            }
            Some(Item::Node(Expr::Path(path))) if matches!(stream.peek(), Some(Item::Node(_))) => {
                Item::Call {
                    name: bare_name(&path)?,
                    sigil: None,
                    args: take_args(&mut stream),
                }
            }
            Some(Item::SectionHead { path, inverted, .. })
                if matches!(stream.peek(), Some(Item::Node(_))) =>
            {
                let sigil = if inverted {
                    Sigil::Inverted
                } else {
                    Sigil::BlockOpen
                };
                Item::Call {
                    name: bare_name(&path)?,
                    sigil: Some(sigil),
                    args: take_args(&mut stream),
                }
            }
            Some(other) => other,
            None => break,
        };
        out.push(head);
    }
    Ok(out)
}

/// Collapse each `{{ ... }}` group into a node or a block marker.
fn expressions(items: Vec<Item>) -> Result<Vec<Item>> {
    let mut stream = Stream::new(items);
    let mut out = Vec::new();
    while let Some(item) = stream.next() {
        if item != Item::Token(Token::ExprStart) {
            out.push(item);
            continue;
        }

        let head = match stream.next() {
            Some(Item::Token(Token::ExprEnd)) => return Err(Error::syntax("empty expression `{{}}`")),
            Some(head) => head,
            None => return Err(Error::syntax("expression is not closed")),
        };
        match stream.next() {
            Some(Item::Token(Token::ExprEnd)) => {}
            Some(other) => {
                return Err(Error::syntax(format!("unexpected {other:?} in expression")))
            }
            None => return Err(Error::syntax("expression is not closed")),
        }

        let converted = match head {
            Item::Node(expr) => Item::Node(expr),
            Item::Call { name, sigil: None, args } => {
                if name == "else" {
                    if !args.is_empty() {
                        return Err(Error::syntax("`else` takes no arguments"));
                    }
                    Item::Else
                } else {
                    Item::Node(Expr::Helper { name, args })
                }
            }
            Item::Call { name, sigil, args } => Item::Open {
                name,
                head: Head::Helper(args),
                inverted: sigil == Some(Sigil::Inverted),
            },
            Item::SectionHead {
                name,
                path,
                inverted,
            } => Item::Open {
                name,
                head: Head::Section(path),
                inverted,
            },
            Item::Token(Token::Word {
                value,
                sigil: Some(Sigil::Inverted),
            }) if value.is_empty() => Item::Else,
            Item::Token(Token::Word {
                value,
                sigil: Some(Sigil::BlockClose),
            }) => Item::Close(value),
            other => return Err(Error::syntax(format!("unexpected {other:?} in expression"))),
        };
        out.push(converted);
    }
    Ok(out)
}

struct OpenBlock {
    name: String,
    head: Head,
    inverted: bool,
    body: Vec<Expr>,
    else_body: Option<Vec<Expr>>,
}

impl OpenBlock {
    fn finish(self) -> Expr {
        let (body, else_body) = if self.inverted {
            (self.else_body.unwrap_or_default(), Some(self.body))
        } else {
            (self.body, self.else_body)
        };
        match self.head {
            Head::Helper(args) => Expr::Block {
                name: self.name,
                args,
                body,
                else_body,
            },
            Head::Section(path) => Expr::Section {
                path,
                body,
                else_body,
            },
        }
    }
}

fn current<'a>(root: &'a mut Vec<Expr>, stack: &'a mut [OpenBlock]) -> &'a mut Vec<Expr> {
    match stack.last_mut() {
        Some(OpenBlock {
            else_body: Some(else_body),
            ..
        }) => else_body,
        Some(open) => &mut open.body,
        None => root,
    }
}

/// Pair block openers with their closers.
fn blocks(items: Vec<Item>) -> Result<Template> {
    let mut root = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();

    for item in items {
        match item {
            Item::Node(expr) => current(&mut root, &mut stack).push(expr),
            Item::Open {
                name,
                head,
                inverted,
            } => stack.push(OpenBlock {
                name,
                head,
                inverted,
                body: Vec::new(),
                else_body: None,
            }),
            Item::Else => {
                let open = stack
                    .last_mut()
                    .ok_or_else(|| Error::mismatch("`else` outside of a block"))?;
                if open.else_body.is_some() {
                    return Err(Error::mismatch(format!(
                        "block `{}` has more than one `else`",
                        open.name
                    )));
                }
                open.else_body = Some(Vec::new());
            }
            Item::Close(name) => {
                let open = stack.pop().ok_or_else(|| {
                    Error::mismatch(format!("`{name}` is closed but was never opened"))
                })?;
                if open.name != name {
                    return Err(Error::mismatch(format!(
                        "block `{}` is closed by `{name}`",
                        open.name
                    )));
                }
                let expr = open.finish();
                current(&mut root, &mut stack).push(expr);
            }
            other => return Err(Error::syntax(format!("unexpected {other:?}"))),
        }
    }

    match stack.pop() {
        Some(open) => Err(Error::mismatch(format!("block `{}` is never closed", open.name))),
        None => Ok(root),
    }
}

/// Give `if` / `unless` their truthiness contract.
fn boolish(template: Template) -> Template {
    template.into_iter().map(boolish_expr).collect()
}

fn boolish_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Block {
            name,
            mut args,
            body,
            else_body,
        } => {
            if (name == "if" || name == "unless") && !args.is_empty() {
                let condition = args.remove(0);
                args.insert(0, Expr::Boolish(Box::new(condition)));
            }
            Expr::Block {
                name,
                args,
                body: boolish(body),
                else_body: else_body.map(boolish),
            }
        }
        Expr::Section {
            path,
            body,
            else_body,
        } => Expr::Section {
            path,
            body: boolish(body),
            else_body: else_body.map(boolish),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn convert_str(template: &str) -> Result<Template> {
        convert(tokenize(template)?, &Configuration::with_builtins())
    }

    fn path(raw: &str) -> Expr {
        Expr::Path(Path::parse(raw))
    }

    fn text(s: &str) -> Expr {
        Expr::Static(s.into())
    }

    #[test]
    fn text_and_paths() {
        let tree = convert_str("Hi {{name}} from {{@root.city}}").unwrap();
        assert_eq!(tree, vec![text("Hi "), path("name"), text(" from "), path("@root.city")]);
    }

    #[test]
    fn comments_disappear() {
        let tree = convert_str("a{{! note }}b{{!-- x }} y --}}c").unwrap();
        assert_eq!(tree, vec![text("a"), text("b"), text("c")]);
    }

    #[test]
    fn registered_helper_with_arguments() {
        let config = Configuration::with_builtins();
        config.register_helper("link_to", |_: &mut dyn std::fmt::Write, _: &crate::Frame<'_>, _: &[serde_json::Value]| Ok(()));
        let tree = convert(tokenize(r#"{{link_to url "text"}}"#).unwrap(), &config).unwrap();
        assert_eq!(
            tree,
            vec![Expr::Helper {
                name: "link_to".into(),
                args: vec![path("url"), text("text")],
            }]
        );
    }

    #[test]
    fn unregistered_name_with_arguments_binds_late() {
        let tree = convert_str("{{link_to url text}}").unwrap();
        assert_eq!(
            tree,
            vec![Expr::Helper {
                name: "link_to".into(),
                args: vec![path("url"), path("text")],
            }]
        );
    }

    #[test]
    fn if_else_block_gets_boolish_condition() {
        let tree = convert_str("{{#if ok}}A{{else}}B{{/if}}").unwrap();
        assert_eq!(
            tree,
            vec![Expr::Block {
                name: "if".into(),
                args: vec![Expr::Boolish(Box::new(path("ok")))],
                body: vec![text("A")],
                else_body: Some(vec![text("B")]),
            }]
        );
    }

    #[test]
    fn unregistered_block_is_a_section() {
        let tree = convert_str("{{#items}}{{name}}{{/items}}").unwrap();
        assert_eq!(
            tree,
            vec![Expr::Section {
                path: Path::parse("items"),
                body: vec![path("name")],
                else_body: None,
            }]
        );
    }

    #[test]
    fn inverted_section_swaps_bodies() {
        let tree = convert_str("{{^items}}none{{/items}}").unwrap();
        assert_eq!(
            tree,
            vec![Expr::Section {
                path: Path::parse("items"),
                body: vec![],
                else_body: Some(vec![text("none")]),
            }]
        );
    }

    #[test]
    fn inverse_marker_acts_as_else() {
        let tree = convert_str("{{#each xs}}x{{^}}empty{{/each}}").unwrap();
        match &tree[0] {
            Expr::Block { else_body, .. } => assert_eq!(else_body, &Some(vec![text("empty")])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn partial_with_and_without_context() {
        let tree = convert_str("{{> card}}{{> card person}}").unwrap();
        assert_eq!(
            tree,
            vec![
                Expr::Partial {
                    name: "card".into(),
                    context: None,
                },
                Expr::Partial {
                    name: "card".into(),
                    context: Some(Box::new(path("person"))),
                },
            ]
        );
    }

    #[test]
    fn standalone_lines_are_removed() {
        let tree = convert_str("{{#if a}}\n  x\n{{else}}\n  y\n{{/if}}\n").unwrap();
        assert_eq!(
            tree,
            vec![Expr::Block {
                name: "if".into(),
                args: vec![Expr::Boolish(Box::new(path("a")))],
                body: vec![text("  x\n")],
                else_body: Some(vec![text("  y\n")]),
            }]
        );
    }

    #[test]
    fn inline_tags_keep_their_whitespace() {
        let tree = convert_str("a {{#if x}} b {{/if}} c").unwrap();
        assert_eq!(tree[0], text("a "));
        assert_eq!(tree[2], text(" c"));
    }

    #[test]
    fn mismatched_close_is_an_error() {
        let err = convert_str("{{#if a}}x{{/each}}").unwrap_err();
        assert!(matches!(err, Error::BlockMismatch { .. }), "{err}");
    }

    #[test]
    fn unclosed_block_is_an_error() {
        assert!(matches!(convert_str("{{#each xs}}x"), Err(Error::BlockMismatch { .. })));
        assert!(matches!(convert_str("{{#things}}x"), Err(Error::BlockMismatch { .. })));
    }

    #[test]
    fn stray_close_and_else_are_errors() {
        assert!(matches!(convert_str("x{{/if}}"), Err(Error::BlockMismatch { .. })));
        assert!(matches!(convert_str("x{{else}}y"), Err(Error::BlockMismatch { .. })));
        assert!(matches!(
            convert_str("{{#if a}}1{{else}}2{{else}}3{{/if}}"),
            Err(Error::BlockMismatch { .. })
        ));
    }

    #[test]
    fn empty_expression_is_a_syntax_error() {
        assert!(matches!(convert_str("{{}}"), Err(Error::Syntax { .. })));
    }
}
