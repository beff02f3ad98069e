use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*([^\s{}#/]+)\s*\}\}").unwrap());
static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(#if|#each|else|/if|/each)(?:\s+([^\s{}]+))?\s*\}\}").unwrap()
});
static LEFTOVER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^{}]*\}\}").unwrap());
static STRAY_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{+").unwrap());

pub const RESERVED_WORDS: [&str; 1] = ["else"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    IfOpen(Option<String>),
    Else,
    IfClose,
    EachOpen(Option<String>),
    EachClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub start: usize,
    pub end: usize,
}

pub fn scan_markers(input: &str) -> Vec<Marker> {
    MARKER_RE
        .captures_iter(input)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(2).map(|m| m.as_str().to_string());
            let kind = match caps.get(1)?.as_str() {
                "#if" => MarkerKind::IfOpen(name),
                "else" => MarkerKind::Else,
                "/if" => MarkerKind::IfClose,
                "#each" => MarkerKind::EachOpen(name),
                _ => MarkerKind::EachClose,
            };
            Some(Marker {
                kind,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// `None` from `resolve` keeps the token as written.
pub fn replace_tokens<F>(input: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    TOKEN_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            if RESERVED_WORDS.contains(&name) {
                return caps[0].to_string();
            }
            resolve(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn leftover_tokens(input: &str) -> Vec<String> {
    let mut names: Vec<String> = LEFTOVER_RE
        .find_iter(input)
        .map(|m| m.as_str()[2..m.as_str().len() - 2].trim().to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

pub fn escape_template_syntax(value: &str) -> String {
    value.replace("{{", "{&#123;")
}

// `{{` never survives: leftover runs of `{` collapse to one.
pub fn strip_template_syntax(input: &str) -> String {
    let stripped = LEFTOVER_RE.replace_all(input, "");
    STRAY_OPEN_RE.replace_all(&stripped, "{").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Conditional(Conditional<'a>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional<'a> {
    pub key: String,
    pub open: &'a str,
    pub then_branch: Vec<Segment<'a>>,
    pub else_marker: Option<&'a str>,
    pub else_branch: Vec<Segment<'a>>,
    pub close: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConditionalTree<'a> {
    pub segments: Vec<Segment<'a>>,
    /// Markers that found no partner and were kept as text.
    pub unbalanced: usize,
}

struct Frame<'a> {
    key: String,
    open: &'a str,
    then_branch: Vec<Segment<'a>>,
    else_marker: Option<&'a str>,
    else_branch: Vec<Segment<'a>>,
}

impl<'a> Frame<'a> {
    fn target(&mut self) -> &mut Vec<Segment<'a>> {
        if self.else_marker.is_some() {
            &mut self.else_branch
        } else {
            &mut self.then_branch
        }
    }

    fn into_text(self) -> Vec<Segment<'a>> {
        let mut out = vec![Segment::Text(self.open)];
        out.extend(self.then_branch);
        if let Some(else_marker) = self.else_marker {
            out.push(Segment::Text(else_marker));
            out.extend(self.else_branch);
        }
        out
    }
}

fn current<'a, 'f>(
    stack: &'f mut [Frame<'a>],
    root: &'f mut Vec<Segment<'a>>,
) -> &'f mut Vec<Segment<'a>> {
    match stack.last_mut() {
        Some(frame) => frame.target(),
        None => root,
    }
}

/// Builds the conditional block tree. An open marker pairs with the first close
/// at its own depth; `{{#each}}` markers are ordinary text here.
pub fn parse_conditionals(input: &str) -> ConditionalTree<'_> {
    let mut root: Vec<Segment<'_>> = Vec::new();
    let mut stack: Vec<Frame<'_>> = Vec::new();
    let mut unbalanced = 0;
    let mut cursor = 0;

    for marker in scan_markers(input) {
        let raw = &input[marker.start..marker.end];
        match marker.kind {
            MarkerKind::EachOpen(_) | MarkerKind::EachClose => continue,
            _ => {}
        }
        if marker.start > cursor {
            current(&mut stack, &mut root).push(Segment::Text(&input[cursor..marker.start]));
        }
        cursor = marker.end;

        match marker.kind {
            MarkerKind::IfOpen(Some(key)) => stack.push(Frame {
                key,
                open: raw,
                then_branch: Vec::new(),
                else_marker: None,
                else_branch: Vec::new(),
            }),
            MarkerKind::Else => {
                let accepts_else = stack.last().is_some_and(|frame| frame.else_marker.is_none());
                match stack.last_mut() {
                    Some(frame) if accepts_else => frame.else_marker = Some(raw),
                    _ => {
                        unbalanced += 1;
                        current(&mut stack, &mut root).push(Segment::Text(raw));
                    }
                }
            }
            MarkerKind::IfClose => match stack.pop() {
                Some(frame) => {
                    let block = Segment::Conditional(Conditional {
                        key: frame.key,
                        open: frame.open,
                        then_branch: frame.then_branch,
                        else_marker: frame.else_marker,
                        else_branch: frame.else_branch,
                        close: raw,
                    });
                    current(&mut stack, &mut root).push(block);
                }
                None => {
                    unbalanced += 1;
                    root.push(Segment::Text(raw));
                }
            },
            // `{{#if}}` without a condition name
            _ => {
                unbalanced += 1;
                current(&mut stack, &mut root).push(Segment::Text(raw));
            }
        }
    }

    if cursor < input.len() {
        current(&mut stack, &mut root).push(Segment::Text(&input[cursor..]));
    }

    while let Some(frame) = stack.pop() {
        unbalanced += 1;
        let pieces = frame.into_text();
        current(&mut stack, &mut root).extend(pieces);
    }

    ConditionalTree {
        segments: root,
        unbalanced,
    }
}

/// Writes the tree back out. `decide` picks a branch for a condition name, or
/// returns `None` to keep the block's markers for a later pass.
pub fn render_segments<F>(segments: &[Segment<'_>], decide: &F, out: &mut String)
where
    F: Fn(&str) -> Option<bool>,
{
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Conditional(block) => match decide(&block.key) {
                Some(true) => render_segments(&block.then_branch, decide, out),
                Some(false) => render_segments(&block.else_branch, decide, out),
                None => {
                    out.push_str(block.open);
                    render_segments(&block.then_branch, decide, out);
                    if let Some(else_marker) = block.else_marker {
                        out.push_str(else_marker);
                        render_segments(&block.else_branch, decide, out);
                    }
                    out.push_str(block.close);
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopBlock {
    pub collection: String,
    pub start: usize,
    pub body_start: usize,
    pub body_end: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoopScan {
    pub blocks: Vec<LoopBlock>,
    pub unbalanced: usize,
}

/// Finds loop blocks over accepted collections. Matching is non-greedy: an open
/// marker closes at the next `{{/each}}`, whatever lies between.
pub fn find_loop_blocks<F>(input: &str, accepts: F) -> LoopScan
where
    F: Fn(&str) -> bool,
{
    let mut scan = LoopScan::default();
    let mut pending: Option<(String, usize, usize)> = None;

    for marker in scan_markers(input) {
        match marker.kind {
            MarkerKind::EachOpen(Some(name)) if pending.is_none() && accepts(&name) => {
                pending = Some((name, marker.start, marker.end));
            }
            MarkerKind::EachClose => match pending.take() {
                Some((collection, start, body_start)) => scan.blocks.push(LoopBlock {
                    collection,
                    start,
                    body_start,
                    body_end: marker.start,
                    end: marker.end,
                }),
                None => scan.unbalanced += 1,
            },
            _ => {}
        }
    }

    if pending.is_some() {
        scan.unbalanced += 1;
    }
    scan
}
