//! Rules over ERB and HAML views: edits are computed on the Ruby surrogate
//! and land at the right place in the template.

use node_rewriter::mutation::{Action, ActionKind, MutationSession};
use node_rewriter::query::NodePattern;
use node_rewriter::template::{Boundary, Encoded, EngineRegistry, Haml, TemplateEngine};
use node_rewriter::{Rule, Workspace};
use std::fs;
use tempfile::TempDir;

fn view(name: &str, contents: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    dir
}

fn rename_login() -> Rule {
    Rule::builder("views", "rename_login")
        .body(|scope| {
            scope.within_files(&["app/views/**/*"], |ctx| {
                ctx.within(&NodePattern::kind("call").attr("method", "login"), |ctx| {
                    ctx.replace(&["method"], "username")
                })
            })
        })
        .build()
}

#[test]
fn erb_call_is_renamed_in_place() {
    let raw = "<div>\n  <% if current_user %>\n    <%= current_user.login %>\n  <% end %>\n</div>\n";
    let dir = view("app/views/users/show.html.erb", raw);
    let ws = Workspace::at(dir.path()).unwrap();

    rename_login().process(&ws).unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("app/views/users/show.html.erb")).unwrap(),
        raw.replace("current_user.login", "current_user.username")
    );
}

#[test]
fn haml_edits_after_synthetic_ends_are_shifted_back() {
    let raw = "- if current_user\n  = current_user.login\n%p\n  = link_to current_user.login, root_path\n";
    let dir = view("app/views/users/show.html.haml", raw);
    let ws = Workspace::at(dir.path()).unwrap();

    let results = rename_login().test(&ws).unwrap();
    assert_eq!(results.len(), 1);
    let actions = results[0].actions.as_ref().unwrap();
    assert_eq!(actions.len(), 2);
    for action in actions {
        assert_eq!(&raw[action.start..action.end], "login");
    }

    rename_login().process(&ws).unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("app/views/users/show.html.haml")).unwrap(),
        raw.replace(".login", ".username")
    );
}

#[test]
fn erb_statement_becomes_expression() {
    let raw = "<% form_for @post do |f| %>\n<% end %>\n";
    let dir = view("app/views/posts/new.html.erb", raw);
    let ws = Workspace::at(dir.path()).unwrap();
    let rule = Rule::builder("rails", "form_for_expression")
        .body(|scope| {
            scope.within_files(&["**/*.erb"], |ctx| {
                ctx.within(&NodePattern::kind("call").attr("method", "form_for"), |ctx| {
                    ctx.erb_stmt_to_expr();
                    Ok(())
                })
            })
        })
        .build();

    rule.process(&ws).unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("app/views/posts/new.html.erb")).unwrap(),
        "<%= form_for @post do |f| %>\n<% end %>\n"
    );
}

#[test]
fn remap_shifts_only_past_boundaries() {
    // "end\n" (4 bytes) was synthesized at surrogate offset 10.
    let encoded = Encoded::new(
        "0123456789end\nabcdef".to_string(),
        vec![Boundary {
            offset: 10,
            delta: 4,
        }],
    );
    let raw = "0123456789abcdef";

    let mut session = MutationSession::new(raw);
    session.set_remap(encoded.remapper());
    session.push(Action::new(ActionKind::Replace, 2, 4, "XY"));
    session.push(Action::new(ActionKind::Replace, 14, 16, "AB"));
    let result = session.apply().unwrap();

    assert_eq!(result.new_source.as_deref(), Some("01XY456789ABcdef"));
}

#[test]
fn haml_surrogate_parses_as_ruby() {
    let encoded = Haml.encode("- items.each do |item|\n  = item.name\n%p done\n");
    assert!(!encoded.is_identity());
    assert!(encoded.surrogate().contains("end\n"));
    assert_eq!(
        EngineRegistry::with_defaults()
            .get("haml")
            .map(|engine| engine.name()),
        Some(Haml.name())
    );
}
