use latte_core::Node;

use crate::{Finding, LintContext, Rule};

pub struct AutoClosedBlock;

impl Rule for AutoClosedBlock {
    fn check(&self, cx: &LintContext<'_>, out: &mut Vec<Finding>) {
        cx.doc.walk(&mut |node, _| {
            if let Node::Pair(pair) = node {
                if pair.auto_closed {
                    out.push(Finding::new(
                        pair.open.span,
                        format!("{{{}}} is closed implicitly at end of file", pair.open.name),
                    ));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run;

    #[test]
    fn open_block_at_end_of_file() {
        let text = "<h1>Title</h1>\n{block content}\n<p>x</p>\n";
        let findings = run(&AutoClosedBlock, text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].span.start, text.find("{block").unwrap());
        assert!(findings[0].message.contains("{block}"));
    }

    #[test]
    fn closed_and_non_auto_closing_blocks() {
        assert!(run(&AutoClosedBlock, "{block content}x{/block}").is_empty());
        assert!(run(&AutoClosedBlock, "{spaceless}x").is_empty());
    }
}
