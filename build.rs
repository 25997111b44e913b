use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const CHECKED_EXTENSIONS: &[&str] = &["rs", "md", "yaml", "toml"];

const EXCLUDED_DIRS: &[&str] = &["target", ".git", "examples"];

const EXCLUDED_FILES: &[&str] = &["Cargo.lock"];

/// Patterns that mean a test body bails out instead of failing.
const SKIP_PATTERNS: &[&str] = &["Skipping test", "skipping test", "Test skipped", "test skipped"];

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");

    let sha = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=DURABLE_AGENT_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = PathBuf::from(&manifest_dir);
    let files = collect_files_to_check(&root);

    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    let rust_files: Vec<&PathBuf> = files
        .iter()
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("rs")
                && p.file_name().and_then(|n| n.to_str()) != Some("build.rs")
        })
        .collect();

    enforce_line_limits(&root, &files);
    enforce_no_dead_code_allows(&root, &rust_files);
    enforce_no_test_skips(&root, &rust_files);
    enforce_serial_for_env_mutations(&root, &rust_files);
}

fn enforce_line_limits(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in files {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                let line_count = content.lines().filter(|l| !l.trim().is_empty()).count();
                if line_count > MAX_LINES {
                    violations.push((relative(root, file), line_count));
                }
            }
            Err(e) => println!(
                "cargo:warning=Could not read file {}: {}",
                relative(root, file).display(),
                e
            ),
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("FILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES);
        eprintln!("========================================");
        for (path, lines) in &violations {
            eprintln!(
                "  {} - {} lines (exceeds by {})",
                path.display(),
                lines,
                lines - MAX_LINES
            );
        }
        eprintln!("========================================\n");
        panic!(
            "Build failed: {} file(s) exceed the {} line limit",
            violations.len(),
            MAX_LINES
        );
    }
}

fn enforce_no_dead_code_allows(root: &Path, rust_files: &[&PathBuf]) {
    let mut violations = Vec::new();
    for file in rust_files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
            {
                violations.push((relative(root, file), line_num + 1, trimmed.to_string()));
            }
        }
    }

    report(
        "#[allow(dead_code)] IS NOT ALLOWED",
        "Delete unused code, or gate test-only helpers behind #[cfg(test)].",
        &violations,
    );
}

fn enforce_no_test_skips(root: &Path, rust_files: &[&PathBuf]) {
    let mut violations = Vec::new();
    for file in rust_files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        for test in test_bodies(&content) {
            let skipped = test.lines.iter().any(|(_, line, depth)| {
                SKIP_PATTERNS.iter().any(|p| line.contains(p))
                    || (line.trim() == "return;" && *depth > 1)
            });
            if skipped {
                violations.push((
                    relative(root, file),
                    test.start,
                    format!("test `{}` skips silently", test.name),
                ));
            }
        }
    }

    report(
        "SILENT TEST SKIPS ARE NOT ALLOWED",
        "Tests must FAIL if they cannot run. Assert preconditions instead.",
        &violations,
    );
}

fn enforce_serial_for_env_mutations(root: &Path, rust_files: &[&PathBuf]) {
    let mut violations = Vec::new();
    for file in rust_files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        for test in test_bodies(&content) {
            let mutates_env = test.lines.iter().any(|(_, line, _)| {
                let trimmed = line.trim();
                !trimmed.starts_with("//")
                    && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"))
            });
            if mutates_env && !test.serial {
                violations.push((
                    relative(root, file),
                    test.start,
                    format!("test `{}` mutates env without #[serial]", test.name),
                ));
            }
        }
    }

    report(
        "ENV MUTATIONS REQUIRE #[serial]",
        "Add #[serial] from serial_test to tests that call set_var/remove_var.",
        &violations,
    );
}

struct TestBody<'a> {
    name: String,
    start: usize,
    serial: bool,
    lines: Vec<(usize, &'a str, i32)>,
}

/// Splits a source file into test function bodies, tracking brace depth per line.
fn test_bodies(content: &str) -> Vec<TestBody<'_>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut bodies = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].trim() != "#[test]" {
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut serial = false;
        let mut name = String::new();
        let mut j = i + 1;
        while j < lines.len() {
            let trimmed = lines[j].trim();
            if trimmed == "#[serial]" || trimmed == "#[serial_test::serial]" {
                serial = true;
            }
            if let Some(fn_pos) = trimmed.find("fn ") {
                let after_fn = trimmed.get(fn_pos + 3..).unwrap_or_default();
                name = after_fn
                    .split('(')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                break;
            }
            j += 1;
        }

        let mut depth = 0;
        let mut body = Vec::new();
        while j < lines.len() {
            for c in lines[j].chars() {
                match c {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            body.push((j + 1, lines[j], depth));
            j += 1;
            if depth == 0 && body.iter().any(|(_, l, _)| l.contains('{')) {
                break;
            }
        }

        bodies.push(TestBody {
            name,
            start,
            serial,
            lines: body,
        });
        i = j;
    }

    bodies
}

fn report(title: &str, advice: &str, violations: &[(PathBuf, usize, String)]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n========================================");
    eprintln!("{}", title);
    eprintln!("========================================\n");
    for (path, line_num, message) in violations {
        eprintln!("  {}:{}", path.display(), line_num);
        eprintln!("    {}\n", message);
    }
    eprintln!("========================================");
    eprintln!("{}", advice);
    eprintln!("========================================\n");
    panic!("Build failed: {} ({} occurrence(s))", title, violations.len());
}

fn relative(root: &Path, file: &Path) -> PathBuf {
    file.strip_prefix(root).unwrap_or(file).to_path_buf()
}

fn collect_files_to_check(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Ok(output) = Command::new("git")
        .args(["ls-files"])
        .current_dir(root)
        .output()
    {
        if output.status.success() {
            if let Ok(stdout) = String::from_utf8(output.stdout) {
                for line in stdout.lines() {
                    let path = root.join(line);
                    if should_check_file(&path, root) {
                        files.push(path);
                    }
                }
                return files;
            }
        }
    }

    walk_directory(root, root, &mut files);
    files
}

fn walk_directory(dir: &Path, root: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if EXCLUDED_DIRS.contains(&name) {
                    continue;
                }
            }
            walk_directory(&path, root, files);
        } else if should_check_file(&path, root) {
            files.push(path);
        }
    }
}

fn should_check_file(path: &Path, root: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };

    if !CHECKED_EXTENSIONS.contains(&ext) {
        return false;
    }

    if let Ok(rel_path) = path.strip_prefix(root) {
        let rel_str = rel_path.to_string_lossy();
        if EXCLUDED_FILES.iter().any(|excluded| rel_str == *excluded) {
            return false;
        }

        for component in rel_path.components() {
            if let Some(name) = component.as_os_str().to_str() {
                if EXCLUDED_DIRS.contains(&name) {
                    return false;
                }
            }
        }
    }

    true
}
