use std::collections::HashSet;
use std::sync::LazyLock;

use crate::types::LatteVersion;

/// Tags understood by every supported Latte version.
pub static COMMON_MACROS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    // Conditions
    s.insert("if");
    s.insert("elseif");
    s.insert("else");
    s.insert("ifset");
    s.insert("elseifset");
    s.insert("ifchanged");
    s.insert("switch");
    s.insert("case");
    // Loops
    s.insert("foreach");
    s.insert("for");
    s.insert("while");
    s.insert("continueIf");
    s.insert("breakIf");
    s.insert("first");
    s.insert("last");
    s.insert("sep");
    // Variables and printing
    s.insert("var");
    s.insert("default");
    s.insert("capture");
    s.insert("=");
    s.insert("_");
    s.insert("translate");
    s.insert("l");
    s.insert("r");
    s.insert("dump");
    s.insert("debugbreak");
    s.insert("php");
    s.insert("do");
    // Blocks and layout
    s.insert("block");
    s.insert("define");
    s.insert("include");
    s.insert("import");
    s.insert("extends");
    s.insert("layout");
    s.insert("snippet");
    s.insert("snippetArea");
    s.insert("sandbox");
    s.insert("spaceless");
    s.insert("syntax");
    s.insert("contentType");
    s.insert("status");
    s.insert("cache");
    s.insert("varType");
    s.insert("templateType");
    s.insert("use");
    // Nette application / forms
    s.insert("link");
    s.insert("plink");
    s.insert("control");
    s.insert("form");
    s.insert("formContainer");
    s.insert("label");
    s.insert("input");
    s.insert("inputError");
    s.insert("nonce");
    s
});

/// Tags that only exist in Latte 2.
pub static V2_MACROS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("ifCurrent");
    s.insert("includeblock");
    s.insert("widget");
    s
});

/// Tags introduced by Latte 3 (also valid in 4).
pub static V3_MACROS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("embed");
    s.insert("varPrint");
    s.insert("templatePrint");
    s.insert("parameters");
    s.insert("try");
    s.insert("rollback");
    s.insert("exitIf");
    s.insert("skipIf");
    s.insert("iterateWhile");
    s.insert("trace");
    s.insert("formPrint");
    s.insert("formClassPrint");
    s
});

/// Tags that never take a closing tag.
pub static VOID_MACROS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("var");
    s.insert("default");
    s.insert("include");
    s.insert("includeblock");
    s.insert("import");
    s.insert("extends");
    s.insert("layout");
    s.insert("php");
    s.insert("do");
    s.insert("varType");
    s.insert("templateType");
    s.insert("parameters");
    s.insert("contentType");
    s.insert("status");
    s.insert("use");
    s.insert("=");
    s.insert("l");
    s.insert("r");
    s.insert("link");
    s.insert("plink");
    s.insert("control");
    s.insert("widget");
    s.insert("input");
    s.insert("inputError");
    s.insert("label");
    s.insert("dump");
    s.insert("debugbreak");
    s.insert("continueIf");
    s.insert("breakIf");
    s.insert("skipIf");
    s.insert("exitIf");
    s.insert("rollback");
    s.insert("sandbox");
    s.insert("varPrint");
    s.insert("templatePrint");
    s.insert("trace");
    s.insert("formPrint");
    s.insert("formClassPrint");
    s.insert("nonce");
    s
});

/// Tags that may only appear inside an enclosing block.
pub static INTERMEDIATE_MACROS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("else");
    s.insert("elseif");
    s.insert("elseifset");
    s.insert("case");
    s
});

/// Blocks that may host an `{else}`.
pub static ELSE_HOSTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("if");
    s.insert("ifset");
    s.insert("ifchanged");
    s.insert("ifCurrent");
    s.insert("foreach");
    s.insert("first");
    s.insert("last");
    s.insert("sep");
    s.insert("try");
    s
});

/// Blocks that may host an `{elseif}` / `{elseifset}`.
pub static ELSEIF_HOSTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("if");
    s.insert("ifset");
    s.insert("ifCurrent");
    s
});

/// Blocks that are closed implicitly when the file ends.
pub static AUTO_CLOSING_MACROS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("if");
    s.insert("foreach");
    s.insert("for");
    s.insert("while");
    s.insert("block");
    s.insert("define");
    s.insert("snippet");
    s.insert("capture");
    s.insert("try");
    s.insert("switch");
    s
});

/// Standard filters shared by all versions.
pub static COMMON_FILTERS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    // Strings
    s.insert("upper");
    s.insert("lower");
    s.insert("capitalize");
    s.insert("firstUpper");
    s.insert("firstLower");
    s.insert("truncate");
    s.insert("trim");
    s.insert("strip");
    s.insert("striptags");
    s.insert("stripHtml");
    s.insert("replace");
    s.insert("replaceRE");
    s.insert("substr");
    s.insert("repeat");
    s.insert("padLeft");
    s.insert("padRight");
    s.insert("indent");
    s.insert("breaklines");
    s.insert("webalize");
    s.insert("reverse");
    s.insert("length");
    s.insert("implode");
    s.insert("explode");
    // Escaping
    s.insert("noescape");
    s.insert("escape");
    s.insert("escapeUrl");
    s.insert("escapeJs");
    s.insert("escapeCss");
    s.insert("escapeHtml");
    s.insert("dataStream");
    s.insert("checkUrl");
    s.insert("nocheck");
    s.insert("query");
    // Numbers and dates
    s.insert("number");
    s.insert("bytes");
    s.insert("date");
    s.insert("round");
    s.insert("ceil");
    s.insert("floor");
    s.insert("clamp");
    // Arrays
    s.insert("batch");
    s.insert("first");
    s.insert("last");
    s.insert("sort");
    s.insert("slice");
    s.insert("splice");
    s.insert("random");
    // Translation
    s.insert("translate");
    s
});

/// Filters introduced by Latte 3 (also valid in 4).
pub static V3_FILTERS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("filter");
    s.insert("group");
    s.insert("odd");
    s.insert("even");
    s.insert("join");
    s.insert("localDate");
    s.insert("spaceless");
    s.insert("toAscii");
    s.insert("column");
    s.insert("commas");
    s
});

/// Exact `n:` attribute names.
pub static STANDARD_ATTRIBUTES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("n:if");
    s.insert("n:ifset");
    s.insert("n:ifcontent");
    s.insert("n:ifchanged");
    s.insert("n:else");
    s.insert("n:elseif");
    s.insert("n:elseifset");
    s.insert("n:foreach");
    s.insert("n:for");
    s.insert("n:while");
    s.insert("n:first");
    s.insert("n:last");
    s.insert("n:sep");
    s.insert("n:block");
    s.insert("n:define");
    s.insert("n:snippet");
    s.insert("n:snippetArea");
    s.insert("n:capture");
    s.insert("n:class");
    s.insert("n:attr");
    s.insert("n:tag");
    s.insert("n:href");
    s.insert("n:name");
    s.insert("n:nonce");
    s.insert("n:syntax");
    s.insert("n:spaceless");
    s.insert("n:translate");
    s.insert("n:try");
    s.insert("n:embed");
    s
});

/// Prefixes that turn any attribute name into a valid `n:` attribute.
pub const ATTRIBUTE_PREFIXES: &[&str] = &[
    "n:inner-", "n:tag-", "n:class-", "n:attr-", "n:class:", "n:attr:", "n:tag:", "n:data-",
];

/// Attribute names rejected even if an extension registers them.
pub const INVALID_ATTRIBUTE_SENTINELS: &[&str] = &["n:invalid"];

/// Accepted `{syntax}` parameters; anything else silently means the default syntax.
pub const SYNTAX_MODE_NAMES: &[&str] = &["latte", "double", "off"];

pub fn is_builtin_macro(name: &str, version: LatteVersion) -> bool {
    if COMMON_MACROS.contains(name) {
        return true;
    }
    match version {
        LatteVersion::V2 => V2_MACROS.contains(name),
        LatteVersion::V3 | LatteVersion::V4 => V3_MACROS.contains(name),
    }
}

pub fn is_builtin_filter(name: &str, version: LatteVersion) -> bool {
    if COMMON_FILTERS.contains(name) {
        return true;
    }
    match version {
        LatteVersion::V2 => false,
        LatteVersion::V3 | LatteVersion::V4 => V3_FILTERS.contains(name),
    }
}

pub fn is_builtin_attribute(name: &str) -> bool {
    STANDARD_ATTRIBUTES.contains(name)
}

/// Whether `name` starts with one of [`ATTRIBUTE_PREFIXES`] and has something after it.
pub fn has_attribute_prefix(name: &str) -> bool {
    ATTRIBUTE_PREFIXES
        .iter()
        .any(|p| name.len() > p.len() && name.starts_with(p))
}
