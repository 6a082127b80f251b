use clap::CommandFactory;
use clap_complete::Shell;

use super::completions::write_completions;
use super::*;

#[rstest]
#[case::bash(Shell::Bash, "_mkctl()")]
#[case::fish(Shell::Fish, "complete -c mkctl")]
#[case::zsh(Shell::Zsh, "#compdef mkctl")]
fn test_write_completions(#[case] shell: Shell, #[case] marker: &str) {
    let mut out = vec![];
    write_completions(shell, MkCommandRoot::command(), &mut out).unwrap();

    let script = String::from_utf8(out).unwrap();
    assert_contains!(&script, marker);
    assert_contains!(&script, "watch");
    assert_contains!(&script, "probes");
}
