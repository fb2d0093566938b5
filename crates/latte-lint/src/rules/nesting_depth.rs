use latte_core::Node;

use crate::{Finding, LintContext, Rule};

/// Reports the first block on each path that goes past `max_depth`.
pub struct NestingDepth {
    pub max_depth: usize,
}

impl NestingDepth {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for NestingDepth {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Rule for NestingDepth {
    fn check(&self, cx: &LintContext<'_>, out: &mut Vec<Finding>) {
        cx.doc.walk(&mut |node, depth| match node {
            Node::Pair(pair) if depth == self.max_depth => out.push(Finding::new(
                pair.open.span,
                format!(
                    "Block {{{}}} is nested {} levels deep (max {})",
                    pair.open.name,
                    depth + 1,
                    self.max_depth
                ),
            )),
            _ => {}
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run;

    fn nested(depth: usize) -> String {
        format!("{}x{}", "{if $a}".repeat(depth), "{/if}".repeat(depth))
    }

    #[test]
    fn default_limit() {
        let findings = run(&NestingDepth::default(), &nested(12));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].span.start, 10 * "{if $a}".len());
        assert!(findings[0].message.contains("11 levels"));
        assert!(run(&NestingDepth::default(), &nested(10)).is_empty());
    }

    #[test]
    fn each_path_reports_once() {
        let text = "{foreach $a as $b}{if $b}{block c}{/block}{/if}{/foreach}\n{if $x}{if $y}{if $z}{/if}{/if}{/if}";
        let starts: Vec<_> = run(&NestingDepth::new(2), text).into_iter().map(|f| f.span.start).collect();
        assert_eq!(starts, vec![text.find("{block").unwrap(), text.find("{if $z").unwrap()]);
    }
}
