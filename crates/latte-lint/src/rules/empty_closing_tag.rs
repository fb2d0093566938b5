use crate::{Finding, LintContext, Rule};

/// `{/}` closes whatever block is innermost.
pub struct EmptyClosingTag;

impl Rule for EmptyClosingTag {
    fn check(&self, cx: &LintContext<'_>, out: &mut Vec<Finding>) {
        out.extend(
            cx.doc
                .tags()
                .into_iter()
                .filter(|tag| tag.closing && tag.name.is_empty())
                .map(|tag| Finding::new(tag.span, "Anonymous closing tag {/}")),
        );
    }
}
