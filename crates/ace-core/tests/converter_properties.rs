//! Diff converter properties

use ace_core::diff::{convert_to_unified_diff, split_file_diffs, REPLACE_CLOSE, SEARCH_OPEN, SEPARATOR};
use proptest::prelude::*;

fn block(file: &str, search: &[String], replace: &[String]) -> String {
    let mut text = format!("{file}\n{SEARCH_OPEN}\n");
    for line in search {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str(SEPARATOR);
    text.push('\n');
    for line in replace {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str(REPLACE_CLOSE);
    text.push('\n');
    text
}

#[test]
fn git_marker_returned_unchanged() {
    let input = "Summary\ndiff --git a/a.rs b/a.rs\nindex 1..2\n";
    assert_eq!(convert_to_unified_diff(input), input);
}

#[test]
fn single_block_header_and_line_counts() {
    let search = vec!["let a = 1;".to_string(), "let b = 2;".to_string()];
    let replace = vec!["let a = 10;".to_string()];
    let out = convert_to_unified_diff(&block("src/vars.rs", &search, &replace));

    assert!(out.contains("diff --git a/src/vars.rs b/src/vars.rs"));
    assert_eq!(out.lines().filter(|l| l.starts_with("-let")).count(), 2);
    assert_eq!(out.lines().filter(|l| l.starts_with("+let")).count(), 1);
}

proptest! {
    #[test]
    fn prose_passes_through_verbatim(text in "[A-Za-z0-9 .,!?\n]{1,200}") {
        let out = convert_to_unified_diff(&text);
        prop_assert_eq!(&out, &text);
        prop_assert!(!out.is_empty());
    }

    #[test]
    fn one_line_per_collected_line(
        search in prop::collection::vec("[a-z][a-z ]{0,15}", 0..8),
        replace in prop::collection::vec("[a-z][a-z ]{0,15}", 0..8),
    ) {
        let out = convert_to_unified_diff(&block("pkg/mod.py", &search, &replace));

        prop_assert!(out.starts_with("diff --git a/pkg/mod.py b/pkg/mod.py\n"));
        let minus = out.lines().filter(|l| l.starts_with('-') && !l.starts_with("--- ")).count();
        let plus = out.lines().filter(|l| l.starts_with('+') && !l.starts_with("+++ ")).count();
        prop_assert_eq!(minus, search.len());
        prop_assert_eq!(plus, replace.len());
        prop_assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn converted_blocks_split_back_per_file(count in 1usize..6) {
        let mut input = String::new();
        for i in 0..count {
            input.push_str(&block(&format!("f{i}.ts"), &["a".to_string()], &["b".to_string()]));
        }
        let files = split_file_diffs(&convert_to_unified_diff(&input));

        prop_assert_eq!(files.len(), count);
        for (i, file) in files.iter().enumerate() {
            prop_assert_eq!(&file.path, &format!("f{i}.ts"));
        }
    }
}
