//! End-to-end rule runs against temporary source trees.

use node_rewriter::config::{Configuration, DirectoryLoader};
use node_rewriter::mutation::ActionKind;
use node_rewriter::query::{Expect, NodePattern};
use node_rewriter::rewriter::InsertOptions;
use node_rewriter::{Registry, Rule, RuleError, Workspace};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn read(root: &Path, name: &str) -> String {
    fs::read_to_string(root.join(name)).unwrap()
}

fn rename_foobar() -> Rule {
    Rule::builder("ruby", "rename_foobar")
        .body(|scope| {
            scope.within_files(&["**/*.rb"], |ctx| {
                ctx.within(&NodePattern::kind("class").attr("name", "Foobar"), |ctx| {
                    ctx.replace(&["name"], "Rejuvinate")
                })
            })
        })
        .build()
}

#[test]
fn renames_class_in_place() {
    let dir = tree(&[("app/models/foobar.rb", "class Foobar\nend")]);
    let ws = Workspace::at(dir.path()).unwrap();

    rename_foobar().process(&ws).unwrap();

    assert_eq!(read(dir.path(), "app/models/foobar.rb"), "class Rejuvinate\nend");
}

fn superclass_twice() -> Rule {
    Rule::builder("ruby", "superclass_twice")
        .body(|scope| {
            scope.within_files(&["*.rb"], |ctx| {
                let bare = NodePattern::kind("class").attr("superclass", Expect::Absent);
                ctx.within(&bare, |ctx| {
                    let options = InsertOptions::default().to("name");
                    ctx.insert(" < Base", options.clone())?;
                    ctx.insert(" < Base", options)
                })
            })
        })
        .build()
}

#[test]
fn same_position_inserts_follow_the_strategy() {
    let dir = tree(&[("post.rb", "class Foobar\nend")]);
    let ws = Workspace::at(dir.path()).unwrap();
    superclass_twice().process(&ws).unwrap();
    assert_eq!(read(dir.path(), "post.rb"), "class Foobar < Base\nend");

    let dir = tree(&[("post.rb", "class Foobar\nend")]);
    let config = Configuration::default()
        .with_root(dir.path())
        .with_strategy(&["keep-running", "allow-insert-at-same-position"]);
    let ws = Workspace::new(config).unwrap();
    superclass_twice().process(&ws).unwrap();
    assert_eq!(read(dir.path(), "post.rb"), "class Foobar < Base < Base\nend");
}

#[test]
fn throw_error_strategy_fails_and_leaves_file() {
    let dir = tree(&[("post.rb", "class Foobar\nend")]);
    let config = Configuration::default()
        .with_root(dir.path())
        .with_strategy(&["throw-error"]);
    let ws = Workspace::new(config).unwrap();

    let err = superclass_twice().process(&ws).unwrap_err();
    assert!(matches!(err.root_cause(), RuleError::Mutation(_)));
    assert_eq!(read(dir.path(), "post.rb"), "class Foobar\nend");
}

#[test]
fn unmet_guard_touches_nothing() {
    let dir = tree(&[
        (".ruby-version", "2.1.0\n"),
        ("post.rb", "class Foobar\n  puts 1\nend"),
    ]);
    let ws = Workspace::at(dir.path()).unwrap();
    let rule = Rule::builder("ruby", "guarded")
        .if_runtime_version(".ruby-version", ">= 2.2.3")
        .body(|scope| {
            scope.within_files(&["*.rb"], |ctx| {
                ctx.within(&NodePattern::kind("call"), |ctx| ctx.warn("puts"))?;
                ctx.within(&NodePattern::kind("class"), |ctx| {
                    ctx.replace(&["name"], "Rejuvinate")
                })
            })
        })
        .build();

    rule.process(&ws).unwrap();
    assert_eq!(read(dir.path(), "post.rb"), "class Foobar\n  puts 1\nend");
    assert!(rule.affected_files().is_empty());
    assert!(rule.warnings().is_empty());
    assert!(rule.test(&ws).unwrap().is_empty());
}

#[test]
fn dependency_guard_reads_lockfile() {
    let dir = tree(&[
        ("Gemfile.lock", "GEM\n  specs:\n    rails (4.2.0)\n"),
        ("post.rb", "class Foobar\nend"),
    ]);
    let ws = Workspace::at(dir.path()).unwrap();
    let rule = Rule::builder("rails", "rails5_only")
        .if_dependency("rails", ">= 5.0")
        .body(|scope| scope.within_files(&["*.rb"], |ctx| ctx.replace_with("nil")))
        .build();

    rule.process(&ws).unwrap();
    assert_eq!(read(dir.path(), "post.rb"), "class Foobar\nend");
}

#[test]
fn simulate_never_writes() {
    let dir = tree(&[("a.rb", "class Foobar\nend"), ("b.rb", "class Other\nend")]);
    let ws = Workspace::at(dir.path()).unwrap();

    let results = rename_foobar().test(&ws).unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].affected);
    assert_eq!(results[0].file_path, Some(PathBuf::from("a.rb")));
    assert!(results[0].new_source.is_none());
    assert_eq!(read(dir.path(), "a.rb"), "class Foobar\nend");
}

#[test]
fn top_level_pattern_leaves_subdirectories_alone() {
    let dir = tree(&[("a.rb", "class Foobar\nend"), ("lib/b.rb", "class Foobar\nend")]);
    let ws = Workspace::at(dir.path()).unwrap();
    assert_eq!(ws.glob(&["*.rb"]).unwrap(), vec![PathBuf::from("a.rb")]);

    Rule::builder("ruby", "rename_top_level")
        .body(|scope| {
            scope.within_files(&["*.rb"], |ctx| {
                ctx.within(&NodePattern::kind("class").attr("name", "Foobar"), |ctx| {
                    ctx.replace(&["name"], "Rejuvinate")
                })
            })
        })
        .build()
        .process(&ws)
        .unwrap();

    assert_eq!(read(dir.path(), "a.rb"), "class Rejuvinate\nend");
    assert_eq!(read(dir.path(), "lib/b.rb"), "class Foobar\nend");
}

#[test]
fn parallel_results_keep_discovery_order() {
    let names: Vec<String> = (0..12).map(|i| format!("lib/file_{i:02}.rb")).collect();
    let files: Vec<(&str, &str)> = names
        .iter()
        .map(|name| (name.as_str(), "class Foobar\nend\n"))
        .collect();
    let dir = tree(&files);

    let sequential = Workspace::at(dir.path()).unwrap();
    let parallel =
        Workspace::new(Configuration::default().with_root(dir.path()).with_workers(4)).unwrap();
    let rule = rename_foobar();

    let expected = rule.test(&sequential).unwrap();
    let actual = rule.test(&parallel).unwrap();
    assert_eq!(expected, actual);
    let paths: Vec<PathBuf> = actual.into_iter().filter_map(|r| r.file_path).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);

    rule.process(&parallel).unwrap();
    assert_eq!(rule.affected_files().len(), 12);
    for name in &names {
        assert_eq!(read(dir.path(), name), "class Rejuvinate\nend\n");
    }
}

#[test]
fn redo_reaches_a_fixed_point() {
    let source = "fn main() {\n    foo(1);\n}\n";
    let chain = |redo: bool| {
        let builder = Rule::builder("rust", "chain").body(|scope| {
            scope.within_files(&["*.rs"], |ctx| {
                ctx.within(
                    &NodePattern::kind("call_expression").attr("function", "bar"),
                    |ctx| ctx.replace(&["function"], "baz"),
                )?;
                ctx.within(
                    &NodePattern::kind("call_expression").attr("function", "foo"),
                    |ctx| ctx.replace(&["function"], "bar"),
                )
            })
        });
        if redo {
            builder.redo_until_no_change().build()
        } else {
            builder.build()
        }
    };

    let dir = tree(&[("main.rs", source)]);
    let ws = Workspace::at(dir.path()).unwrap();
    chain(false).process(&ws).unwrap();
    assert_eq!(read(dir.path(), "main.rs"), "fn main() {\n    bar(1);\n}\n");

    let dir = tree(&[("main.rs", source)]);
    let ws = Workspace::at(dir.path()).unwrap();
    chain(true).process(&ws).unwrap();
    assert_eq!(read(dir.path(), "main.rs"), "fn main() {\n    baz(1);\n}\n");
}

#[test]
fn skip_paths_filter_files() {
    let dir = tree(&[
        ("app/post.rb", "class Foobar\nend"),
        ("vendor/post.rb", "class Foobar\nend"),
    ]);
    let mut config = Configuration::default().with_root(dir.path());
    config.skip_paths = vec!["vendor".to_string()];
    let ws = Workspace::new(config).unwrap();

    rename_foobar().process(&ws).unwrap();
    assert_eq!(read(dir.path(), "app/post.rb"), "class Rejuvinate\nend");
    assert_eq!(read(dir.path(), "vendor/post.rb"), "class Foobar\nend");
}

#[test]
fn sub_rules_load_lazily_and_merge_results() {
    let rules = tree(&[(
        "ruby/flag_puts.toml",
        r#"
[[rules]]
group = "ruby"
name = "flag_puts"
files = ["**/*.rb"]

[rules.query]
type = "node"
kind = "call"
attributes = { method = "puts" }

[rules.operation]
type = "replace-with"
code = "logger.info {{arguments}}"
"#,
    )]);
    let dir = tree(&[("post.rb", "class Foobar\n  puts 1\nend\n")]);
    let registry = Arc::new(Registry::new());
    let ws = Workspace::at(dir.path())
        .unwrap()
        .with_registry(Arc::clone(&registry))
        .with_loader(Arc::new(DirectoryLoader::new(rules.path())));

    let parent = Rule::builder("ruby", "modernize")
        .body(|scope| {
            scope.within_files(&["*.rb"], |ctx| {
                ctx.within(&NodePattern::kind("class").attr("name", "Foobar"), |ctx| {
                    ctx.replace(&["name"], "Rejuvinate")
                })
            })?;
            scope.add_rule("ruby", "flag_puts")
        })
        .register(&registry);

    let results = parent.test(&ws).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(parent.sub_rules(), vec!["ruby/flag_puts".to_string()]);
    assert!(registry.contains("ruby", "flag_puts"));

    parent.process(&ws).unwrap();
    assert_eq!(
        read(dir.path(), "post.rb"),
        "class Rejuvinate\n  logger.info 1\nend\n"
    );
}

#[test]
fn file_effects_in_each_mode() {
    let body = |scope: &mut node_rewriter::RuleScope<'_>| -> Result<(), RuleError> {
        scope.add_file("config/initializers/rejuvinate.rb", "Rejuvinate.setup\n")?;
        scope.remove_file("config/old.rb")
    };

    let dir = tree(&[("config/old.rb", "Old.setup\n")]);
    let ws = Workspace::at(dir.path()).unwrap();
    let rule = Rule::builder("rails", "initializer").body(body).build();

    rule.process_with_sandbox(&ws).unwrap();
    assert!(dir.path().join("config/old.rb").exists());
    assert!(!dir.path().join("config/initializers/rejuvinate.rb").exists());

    let results = rule.test(&ws).unwrap();
    let kinds: Vec<ActionKind> = results
        .iter()
        .map(|r| r.actions.as_ref().unwrap()[0].kind)
        .collect();
    assert_eq!(kinds, vec![ActionKind::AddFile, ActionKind::RemoveFile]);
    assert!(dir.path().join("config/old.rb").exists());

    rule.process(&ws).unwrap();
    assert_eq!(
        read(dir.path(), "config/initializers/rejuvinate.rb"),
        "Rejuvinate.setup\n"
    );
    assert!(!dir.path().join("config/old.rb").exists());

    // A second commit run finds both effects already done.
    rule.process(&ws).unwrap();
}

#[test]
fn helpers_and_warnings_reach_the_rule() {
    let dir = tree(&[("post.rb", "class Foobar\n  puts 'hi'\nend\n")]);
    let ws = Workspace::at(dir.path()).unwrap();
    let rule = Rule::builder("ruby", "shout")
        .helper("shout", |args| args.join(" ").to_uppercase())
        .body(|scope| {
            scope.within_files(&["*.rb"], |ctx| {
                ctx.within(&NodePattern::kind("class"), |ctx| {
                    let name = ctx.helper("shout", &["foobar"])?;
                    ctx.replace(&["name"], &name)
                })?;
                ctx.within(&NodePattern::kind("call").attr("method", "puts"), |ctx| {
                    ctx.warn("puts is discouraged")
                })
            })
        })
        .build();

    rule.process(&ws).unwrap();
    assert_eq!(read(dir.path(), "post.rb"), "class FOOBAR\n  puts 'hi'\nend\n");
    let warnings = rule.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].to_string(), "post.rb#2: puts is discouraged");
}

#[test]
fn unresolved_capability_names_segment_and_node() {
    let dir = tree(&[("post.rb", "class Foobar\nend")]);
    let ws = Workspace::at(dir.path()).unwrap();
    let rule = Rule::builder("ruby", "broken")
        .body(|scope| {
            scope.within_files(&["*.rb"], |ctx| {
                ctx.within(&NodePattern::kind("class"), |ctx| {
                    ctx.replace(&["nonexistent"], "x")
                })
            })
        })
        .build();

    let err = rule.process(&ws).unwrap_err();
    assert!(err.to_string().starts_with("post.rb: "));
    assert_eq!(
        err.root_cause().to_string(),
        "nonexistent is not supported for class Foobar\nend"
    );
    assert_eq!(read(dir.path(), "post.rb"), "class Foobar\nend");
}
