use bindery_script::ast::*;
use bindery_script::{Binding, parse_program, parse_script};

fn single_expr(source: &str) -> Expr {
  let program = parse_program(source).unwrap();
  assert_eq!(program.body.len(), 1, "expected one statement in {source:?}");
  match program.body.into_iter().next().unwrap() {
    Stmt::Expr(expr) => expr,
    other => panic!("expected expression statement, got {:?}", other),
  }
}

#[test]
fn test_trigger_with_callbacks() {
  let expr = single_expr("Api1.run().then(() => showAlert('done')).catch((e) => showAlert(e.message))");
  let Expr::Call { callee, arguments, .. } = expr else {
    panic!("expected call");
  };
  assert_eq!(callee.member_name(), Some("catch"));
  assert_eq!(arguments.len(), 1);
}

#[test]
fn test_object_literal_forms() {
  let expr = single_expr("({ a, 'b': 1, [k]: 2, ...rest, run() { return 1 }, async load() {} })");
  let Expr::Object(properties) = expr else {
    panic!("expected object");
  };
  assert_eq!(properties.len(), 6);
  assert!(matches!(&properties[3], Property::Spread(Expr::Ident(name)) if &**name == "rest"));
  match &properties[5] {
    Property::KeyValue {
      value: Expr::Function(function),
      ..
    } => {
      assert!(function.is_async);
      assert_eq!(function.name.as_deref(), Some("load"));
    }
    other => panic!("unexpected {:?}", other),
  }
}

#[test]
fn test_destructuring_declarations() {
  let program = parse_program("const { a, b: [c, , d = 1], ...rest } = obj").unwrap();
  let Stmt::Declaration { kind, declarators } = &program.body[0] else {
    panic!("expected declaration");
  };
  assert_eq!(*kind, DeclKind::Const);
  let names: Vec<String> = declarators[0]
    .pattern
    .bound_names()
    .iter()
    .map(|name| name.to_string())
    .collect();
  assert_eq!(names, vec!["a", "c", "d", "rest"]);
}

#[test]
fn test_loops() {
  let program = parse_program(
    "for (let i = 0; i < 3; i++) {}\nfor (const x of xs) {}\nfor (const k in o) {}\nwhile (a) a--\ndo { b++ } while (b < 3)",
  )
  .unwrap();
  assert_eq!(program.body.len(), 5);
  assert!(program.body.iter().all(Stmt::is_loop));
}

#[test]
fn test_optional_chaining_and_nullish() {
  let expr = single_expr("user?.profile?.[key] ?? fallback?.()");
  let Expr::Logical {
    op: LogicalOp::Nullish,
    left,
    right,
  } = expr
  else {
    panic!("expected nullish");
  };
  assert!(matches!(*left, Expr::Member { optional: true, .. }));
  assert!(matches!(*right, Expr::Call { optional: true, .. }));
}

#[test]
fn test_template_literal() {
  let expr = single_expr("`Hello ${user.name}, ${count + 1} items`");
  let Expr::Template { quasis, exprs } = expr else {
    panic!("expected template");
  };
  assert_eq!(quasis.len(), 3);
  assert_eq!(exprs.len(), 2);
  assert_eq!(&*quasis[0], "Hello ");
}

#[test]
fn test_new_and_try() {
  let program =
    parse_program("try { new Promise((resolve) => resolve(1)) } catch (e) { throw e } finally { done() }")
      .unwrap();
  assert!(matches!(&program.body[0], Stmt::Try { handler: Some(_), finalizer: Some(_), .. }));
}

#[test]
fn test_errors_report_offsets() {
  let err = parse_program("a + ").unwrap_err();
  assert_eq!(err.offset, 4);
  assert!(err.to_string().contains("end of input"));

  let err = parse_script("this.value").unwrap_err();
  assert!(err.message.contains("not supported"));
}

#[test]
fn test_binding_scripts_parse() {
  let binding = Binding::new("Total: {{ items.map(i => i.price).length }} items");
  for source in binding.scripts() {
    assert!(parse_script(source).is_ok());
  }
}

#[test]
fn test_binding_serde() {
  let binding: Binding =
    serde_json::from_str(r#"{"text":"{{Api1.run()}}","propertyPath":"onClick","entityId":"Button1"}"#).unwrap();
  assert_eq!(binding.location(), "Button1.onClick");
  let json = serde_json::to_value(&binding).unwrap();
  assert_eq!(json["propertyPath"], "onClick");
}
