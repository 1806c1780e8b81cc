//! Turning example code into a runnable script file.

use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::process::Command;

use crate::core_types::Language;

pub const SCRIPT_PREFIX: &str = "docrun_";

/// Wrap raw example code so it runs standalone.
pub fn wrap(language: Language, code: &str) -> String {
    match language {
        Language::Bash => format!("#!/usr/bin/env bash\nset -e\n{}\n", code),
        Language::Sh => format!("#!/bin/sh\nset -e\n{}\n", code),
        Language::Python => format!("#!/usr/bin/env python3\n{}\n", code),
        Language::Go => {
            if declares_main_package(code) {
                format!("{}\n", code)
            } else {
                let (imports, rest) = split_leading_imports(code);
                let body: String = rest.iter().map(|line| format!("\t{}\n", line)).collect();
                let header = if imports.is_empty() {
                    String::new()
                } else {
                    format!("{}\n\n", imports.join("\n"))
                };
                format!("package main\n\n{}func main() {{\n{}}}\n", header, body)
            }
        }
    }
}

/// Leading `import` lines and blocks belong at file scope, not inside `main`.
fn split_leading_imports(code: &str) -> (Vec<&str>, Vec<&str>) {
    let lines: Vec<&str> = code.lines().collect();
    let mut imports = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed.is_empty() {
            i += 1;
            continue;
        }
        if !(trimmed.starts_with("import ") || trimmed.starts_with("import(")) {
            break;
        }
        imports.push(lines[i]);
        i += 1;
        if trimmed.ends_with('(') {
            while i < lines.len() {
                imports.push(lines[i]);
                i += 1;
                if lines[i - 1].trim() == ")" {
                    break;
                }
            }
        }
    }
    (imports, lines[i..].to_vec())
}

fn declares_main_package(code: &str) -> bool {
    code.lines().any(|line| {
        let mut words = line.split_whitespace();
        words.next() == Some("package") && words.next() == Some("main")
    })
}

/// `docrun_<id>_<YYYYmmddHHMMSS>.<ext>`. Two runs of the same example in the
/// same second map to the same name.
pub fn file_name(example_id: &str, language: Language, at: DateTime<Utc>) -> String {
    format!(
        "{}{}_{}.{}",
        SCRIPT_PREFIX,
        sanitize_id(example_id),
        at.format("%Y%m%d%H%M%S"),
        language.extension()
    )
}

/// Keep ids readable in file names while staying inside the workspace.
fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "example".to_string()
    } else {
        cleaned
    }
}

/// Interpreter invocation for a script at `path`.
pub fn command_for(language: Language, path: &Path) -> Command {
    let mut cmd = match language {
        Language::Bash => Command::new("bash"),
        Language::Sh => Command::new("sh"),
        Language::Python => Command::new("python3"),
        Language::Go => {
            let mut cmd = Command::new("go");
            cmd.arg("run");
            cmd
        }
    };
    cmd.arg(path);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_shell_scripts_get_errexit() {
        let script = wrap(Language::Bash, "echo hi");
        assert!(script.starts_with("#!/usr/bin/env bash\nset -e\n"));
        assert!(script.contains("echo hi"));
        assert!(wrap(Language::Sh, "ls").contains("set -e\nls"));
    }

    #[test]
    fn test_python_gets_shebang() {
        assert_eq!(wrap(Language::Python, "print(1)"), "#!/usr/bin/env python3\nprint(1)\n");
    }

    #[test]
    fn test_go_snippet_wrapped_in_main() {
        let script = wrap(Language::Go, "println(\"hi\")");
        assert!(script.starts_with("package main\n"));
        assert!(script.contains("func main() {\n\tprintln(\"hi\")\n}"));
    }

    #[test]
    fn test_go_imports_stay_at_file_scope() {
        let script = wrap(Language::Go, "import \"fmt\"\n\nfmt.Println(\"hi\")");
        assert_eq!(
            script,
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n"
        );

        let script = wrap(Language::Go, "import (\n\t\"fmt\"\n\t\"os\"\n)\nfmt.Println(len(os.Args))");
        assert!(script.starts_with("package main\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n\nfunc main() {\n"));
        assert!(script.contains("\tfmt.Println(len(os.Args))\n}"));
    }

    #[test]
    fn test_go_program_left_alone() {
        let code = "package main\n\nimport \"fmt\"\n\nfunc main() { fmt.Println(1) }";
        assert_eq!(wrap(Language::Go, code), format!("{}\n", code));
    }

    #[test]
    fn test_file_name_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            file_name("guide/intro#2", Language::Python, at),
            "docrun_guide_intro_2_20240309140507.py"
        );
        assert_eq!(file_name("x", Language::Go, at), file_name("x", Language::Go, at));
        assert_eq!(file_name("", Language::Sh, at), "docrun_example_20240309140507.sh");
    }

    #[test]
    fn test_go_runs_through_go_run() {
        let cmd = command_for(Language::Go, Path::new("/tmp/x.go"));
        let args: Vec<_> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.as_std().get_program(), "go");
        assert_eq!(args, vec!["run", "/tmp/x.go"]);
    }
}
