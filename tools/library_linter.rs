/// Library Linter: checks a JSON template library for dangling
/// references, reference cycles and templates that do not resolve.
///
/// Usage: library_linter <library.json> [<library.json> ...]
use std::env;
use std::path::Path;
use std::process;

use narrative_events::core::composer::lint_library;
use narrative_events::core::library::TemplateLibrary;
use narrative_events::core::rules::RuleInterpreter;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: library_linter <library.json> [<library.json> ...]");
        process::exit(if args.is_empty() { 1 } else { 0 });
    }

    let interpreter = RuleInterpreter::new();
    let mut total_issues = 0;

    for path in &args {
        let library = match TemplateLibrary::load_json(Path::new(path)) {
            Ok(library) => library,
            Err(e) => {
                eprintln!("{}: failed to load: {}", path, e);
                total_issues += 1;
                continue;
            }
        };

        let issues = lint_library(&library, &interpreter);
        for issue in &issues {
            println!("{}: [{}] {}", path, issue.template, issue.message);
        }
        println!("{}: {} templates, {} issues", path, library.len(), issues.len());
        total_issues += issues.len();
    }

    if total_issues > 0 {
        process::exit(1);
    }
}
