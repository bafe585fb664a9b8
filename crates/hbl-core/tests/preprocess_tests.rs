use hbl_core::preprocess;
use pretty_assertions::assert_eq;

macro_rules! preprocess_case {
    ($name:ident, $input:expr, $expected:expr) => {
        #[test]
        fn $name() {
            assert_eq!(preprocess($input), $expected);
        }
    };
}

preprocess_case!(plain_text_is_untouched, "Hello {{name}}!", "Hello {{name}}!");
preprocess_case!(
    clean_multiline_text_is_untouched,
    "line one\nline {{two}}\n",
    "line one\nline {{two}}\n"
);
preprocess_case!(leading_trim_marker, "Hello {{~name}}!", "Hello{{name}}!");
preprocess_case!(trailing_trim_marker, "{{name~}}   !", "{{name}}!");
preprocess_case!(
    merges_nested_openers_and_closers,
    "{{#if a}}\n{{#if b}}\n{{Hello}}\n{{/if}}\n{{/if}}",
    "{{#if a}}{{#if b}}\n{{Hello}}\n{{/if}}{{/if}}"
);
preprocess_case!(
    reattaches_inverse_to_following_block,
    "\n{{#if a}}\n{{^}}\n{{#if b}}\nHello\n{{/if}}\n{{/if}}",
    "{{#if a}}\n{{^}}{{#if b}}\nHello\n{{/if}}{{/if}}"
);
preprocess_case!(
    reattaches_inverse_to_following_closer,
    "\n{{#if a}}\nHi\n{{^}}\n{{/if}}",
    "{{#if a}}\nHi\n{{^}}{{/if}}"
);
preprocess_case!(
    else_if_chain_moves_onto_branch_lines,
    "{{#if a}}\na\n{{else if b}}\nb\n{{else if c}}\nc\n{{~else if d}}\nd\n{{else if e}}\ne\n{{else if f}}\nf\n{{else if g}}\ng\n{{/if}}",
    "{{#if a}}\na\n{{else if b}}b\n{{else if c}}c{{else if d}}d\n{{else if e}}e\n{{else if f}}f\n{{else if g}}g\n{{/if}}"
);
preprocess_case!(
    trim_markers_eliminate_blank_lines,
    "{{#if a~}}\n\n\n\n\n          Hi\n        {{~/if}}",
    "{{#if a}}Hi{{/if}}"
);
preprocess_case!(
    block_after_text_keeps_its_newline,
    "Hello\n{{#if a}}\nX\n{{/if}}",
    "Hello{{NEWLINE}}{{#if a}}\nX\n{{/if}}"
);
preprocess_case!(
    closers_separated_by_text_stay_on_their_own_lines,
    "{{#if a}}\n{{#if b}}\nX\n{{/if}}\nY\n{{/if}}",
    "{{#if a}}{{#if b}}\nX\n{{/if}}\nY\n{{/if}}"
);
