/// Where a path starts resolving from.
#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    /// The current frame, after climbing `parent_hops`.
    Current,
    /// The outermost frame of the render (`@root`).
    Root,
    /// Iteration metadata of the nearest enclosing loop (`@index`, `@first`, `@last`, `@key`).
    Data(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<String>,
    pub parent_hops: usize,
    pub anchor: Anchor,
}

impl Path {
    /// Parse the raw text of a path word: `a.b`, `../x`, `this`, `@root.city`, `@index`.
    pub fn parse(raw: &str) -> Path {
        let mut rest = raw;
        let mut parent_hops = 0;
        let mut anchor = Anchor::Current;

        if let Some(data) = rest.strip_prefix('@') {
            let (name, tail) = split_first_segment(data);
            anchor = if name == "root" {
                Anchor::Root
            } else {
                Anchor::Data(name.to_string())
            };
            rest = tail;
        } else {
            loop {
                if let Some(tail) = rest.strip_prefix("../") {
                    parent_hops += 1;
                    rest = tail;
                } else if rest == ".." {
                    parent_hops += 1;
                    rest = "";
                } else {
                    break;
                }
            }
        }

        let segments = rest
            .split(['.', '/'])
            .filter(|s| !s.is_empty() && *s != "this")
            .map(str::to_string)
            .collect();

        Path {
            segments,
            parent_hops,
            anchor,
        }
    }

    /// `this` / `.` with nothing else.
    pub fn is_this(&self) -> bool {
        self.segments.is_empty() && self.parent_hops == 0 && self.anchor == Anchor::Current
    }
}

fn split_first_segment(raw: &str) -> (&str, &str) {
    match raw.find(['.', '/']) {
        Some(idx) => (&raw[..idx], &raw[idx + 1..]),
        None => (raw, ""),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Static(String),
    Path(Path),
    Helper {
        name: String,
        args: Vec<Expr>,
    },
    Block {
        name: String,
        args: Vec<Expr>,
        body: Vec<Expr>,
        else_body: Option<Vec<Expr>>,
    },
    /// `{{#name}}` where `name` is not a helper: resolved as a path at render time.
    Section {
        path: Path,
        body: Vec<Expr>,
        else_body: Option<Vec<Expr>>,
    },
    Boolish(Box<Expr>),
    Partial {
        name: String,
        context: Option<Box<Expr>>,
    },
}

pub type Template = Vec<Expr>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_path() {
        let path = Path::parse("a.b.c");
        assert_eq!(path.segments, vec!["a", "b", "c"]);
        assert_eq!(path.parent_hops, 0);
        assert_eq!(path.anchor, Anchor::Current);
    }

    #[test]
    fn parent_hops_are_counted() {
        let path = Path::parse("../../Bar");
        assert_eq!(path.segments, vec!["Bar"]);
        assert_eq!(path.parent_hops, 2);
    }

    #[test]
    fn this_forms() {
        assert!(Path::parse("this").is_this());
        assert!(Path::parse(".").is_this());
        assert_eq!(Path::parse("this.name").segments, vec!["name"]);
        assert_eq!(Path::parse("./name").segments, vec!["name"]);
    }

    #[test]
    fn data_variables() {
        let root = Path::parse("@root.city");
        assert_eq!(root.anchor, Anchor::Root);
        assert_eq!(root.segments, vec!["city"]);

        let index = Path::parse("@index");
        assert_eq!(index.anchor, Anchor::Data("index".into()));
        assert!(index.segments.is_empty());
    }
}
