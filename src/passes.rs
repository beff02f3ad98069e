use crate::config::EngineConfig;
use crate::error::Degradation;
use crate::model::{LogoResult, PlaceholderMap, is_truthy, lookup};
use crate::parser::{
    escape_template_syntax, find_loop_blocks, leftover_tokens, parse_conditionals, render_segments,
    replace_tokens, strip_template_syntax,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    LogoTokens,
    LogoGuards,
    Scalars,
    Loop,
    Conditionals,
    Cleanup,
}

impl Pass {
    /// Later passes rely on the markers earlier ones have already consumed.
    pub const ORDER: [Pass; 6] = [
        Pass::LogoTokens,
        Pass::LogoGuards,
        Pass::Scalars,
        Pass::Loop,
        Pass::Conditionals,
        Pass::Cleanup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::LogoTokens => "logo-tokens",
            Pass::LogoGuards => "logo-guards",
            Pass::Scalars => "scalars",
            Pass::Loop => "loop",
            Pass::Conditionals => "conditionals",
            Pass::Cleanup => "cleanup",
        }
    }

    pub fn apply(self, template: &str, input: &PipelineInput<'_>) -> String {
        let config = input.config;
        match self {
            Pass::LogoTokens => substitute_logo(template, input.logo, &config.logo_aliases),
            Pass::LogoGuards => resolve_logo_guards(template, input.logo, &config.logo_aliases),
            Pass::Scalars => substitute_scalars(template, input.scalars, config),
            Pass::Loop => expand_loop(template, input.items, input.scalars, config),
            Pass::Conditionals => resolve_conditionals(template, input.scalars),
            Pass::Cleanup => cleanup(template),
        }
    }
}

pub fn substitute_logo(template: &str, logo: &LogoResult, aliases: &[String]) -> String {
    replace_tokens(template, |name| {
        aliases
            .iter()
            .any(|alias| alias == name)
            .then(|| escape_template_syntax(logo.substitution()))
    })
}

/// Resolves `{{#if <logo alias>}}` blocks by logo presence. Other conditionals
/// keep their markers.
pub fn resolve_logo_guards(template: &str, logo: &LogoResult, aliases: &[String]) -> String {
    let tree = parse_conditionals(template);
    let decide = |key: &str| {
        aliases
            .iter()
            .any(|alias| alias == key)
            .then_some(logo.has_logo())
    };
    let mut out = String::with_capacity(template.len());
    render_segments(&tree.segments, &decide, &mut out);
    out
}

/// Replaces tokens whose key is in `scalars`. Unknown tokens are left for later
/// passes, and loop bodies are skipped so line-item fields win inside them.
pub fn substitute_scalars(template: &str, scalars: &PlaceholderMap, config: &EngineConfig) -> String {
    let resolve = |name: &str| {
        if config.is_logo_alias(name) {
            return None;
        }
        scalars.get(name).cloned()
    };

    let scan = find_loop_blocks(template, |name| config.is_loop_collection(name));
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for block in &scan.blocks {
        out.push_str(&replace_tokens(&template[cursor..block.start], resolve));
        out.push_str(&template[block.start..block.end]);
        cursor = block.end;
    }
    out.push_str(&replace_tokens(&template[cursor..], resolve));
    out
}

/// Expands the first loop block once per item. With no items the configured
/// empty-state row takes its place; further loop blocks are dropped.
pub fn expand_loop(
    template: &str,
    items: &[PlaceholderMap],
    scope: &PlaceholderMap,
    config: &EngineConfig,
) -> String {
    let scan = find_loop_blocks(template, |name| config.is_loop_collection(name));
    let Some(first) = scan.blocks.first() else {
        return template.to_string();
    };

    let body = &template[first.body_start..first.body_end];
    let row_template = if body.trim().is_empty() {
        config.default_row.as_str()
    } else {
        body
    };

    let mut out = String::with_capacity(template.len());
    out.push_str(&template[..first.start]);
    out.push_str(&render_rows(row_template, items, scope, config));

    let mut cursor = first.end;
    for extra in scan.blocks.iter().skip(1) {
        out.push_str(&template[cursor..extra.start]);
        cursor = extra.end;
    }
    out.push_str(&template[cursor..]);
    out
}

pub fn render_rows(
    row_template: &str,
    items: &[PlaceholderMap],
    scope: &PlaceholderMap,
    config: &EngineConfig,
) -> String {
    if items.is_empty() {
        return config.empty_state_row.clone();
    }
    items
        .iter()
        .map(|item| render_row(row_template, item, scope))
        .collect()
}

fn render_row(row_template: &str, item: &PlaceholderMap, scope: &PlaceholderMap) -> String {
    let value = |key: &str| item.get(key).or_else(|| scope.get(key));

    let tree = parse_conditionals(row_template);
    let decide = |key: &str| Some(value(key).is_some_and(|v| !v.trim().is_empty()));
    let mut resolved = String::with_capacity(row_template.len());
    render_segments(&tree.segments, &decide, &mut resolved);

    replace_tokens(&resolved, |name| value(name).cloned())
}

// A condition holds when its value has non-whitespace content.
pub fn resolve_conditionals(template: &str, scalars: &PlaceholderMap) -> String {
    let tree = parse_conditionals(template);
    let decide = |key: &str| Some(is_truthy(scalars, key));
    let mut out = String::with_capacity(template.len());
    render_segments(&tree.segments, &decide, &mut out);
    out
}

pub fn cleanup(template: &str) -> String {
    strip_template_syntax(template)
}

pub struct PipelineInput<'a> {
    pub logo: &'a LogoResult,
    pub scalars: &'a PlaceholderMap,
    pub items: &'a [PlaceholderMap],
    pub config: &'a EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub html: String,
    pub diagnostics: Vec<Degradation>,
}

pub struct Pipeline;

impl Pipeline {
    pub fn run(template: &str, input: &PipelineInput<'_>) -> PipelineOutput {
        let mut diagnostics = Vec::new();

        let unbalanced = parse_conditionals(template).unbalanced
            + find_loop_blocks(template, |name| input.config.is_loop_collection(name)).unbalanced;
        if unbalanced > 0 {
            diagnostics.push(Degradation::UnbalancedMarkers { count: unbalanced });
        }

        let mut html = template.to_string();
        for pass in Pass::ORDER {
            match pass {
                Pass::Loop => {
                    let blocks =
                        find_loop_blocks(&html, |name| input.config.is_loop_collection(name))
                            .blocks
                            .len();
                    if blocks > 1 {
                        tracing::warn!(blocks, "template has more than one loop block, extra blocks dropped");
                        diagnostics.push(Degradation::DuplicateLoopBlock { count: blocks - 1 });
                    }
                }
                Pass::Cleanup => {
                    let leftovers = leftover_tokens(&html);
                    if !leftovers.is_empty() {
                        tracing::debug!(?leftovers, "stripping unresolved placeholders");
                        diagnostics.push(Degradation::UnresolvedPlaceholders(leftovers));
                    }
                }
                _ => {}
            }
            html = pass.apply(&html, input);
            tracing::trace!(pass = pass.name(), len = html.len(), "pass applied");
        }

        PipelineOutput { html, diagnostics }
    }
}

pub fn render_scalars(template: &str, scalars: &PlaceholderMap, config: &EngineConfig) -> String {
    let logo = LogoResult::from_url(
        config
            .logo_aliases
            .iter()
            .map(|alias| lookup(scalars, alias))
            .find(|value| !value.trim().is_empty())
            .unwrap_or(""),
    );
    let input = PipelineInput {
        logo: &logo,
        scalars,
        items: &[],
        config,
    };
    Pipeline::run(template, &input).html
}
