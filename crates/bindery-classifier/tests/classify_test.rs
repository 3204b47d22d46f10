use bindery_classifier::{Classification, classify, classify_binding};
use bindery_script::Binding;

#[test]
fn test_value_expression() {
  let classification = classify("{{ 1 + 1 }}");
  assert_eq!(classification, Classification::SimpleExpression);
  assert!(classification.selector_enabled());
}

#[test]
fn test_single_trigger_shapes_are_representable() {
  let shapes = [
    "{{Api1.run()}}",
    "{{ Query1.clear() }}",
    "{{showAlert('hi', 'success')}}",
    "{{ storeValue('key', Input1.text); }}",
    "{{Api1.run().then(() => showAlert('done'))}}",
    "{{Api1.run().then(() => { showAlert('done') }, () => showAlert('failed'))}}",
    "{{Api1.run().catch((e) => showAlert(e.message, 'error'))}}",
    "{{Api1.run(() => showAlert('ok'), () => showAlert('ko'), { page: 2 })}}",
    "{{Api1.run({ page: Table1.pageNo + 1 })}}",
  ];
  for text in shapes {
    assert_eq!(classify(text), Classification::SimpleExpression, "{text}");
  }
}

#[test]
fn test_programs_are_not_representable() {
  let programs = [
    // multiple statements
    "{{ showAlert('a'); showAlert('b') }}",
    "{{ const x = 1 }}",
    // loops and iteration
    "{{ for (const row of Table1.tableData) { storeValue(row.id, row) } }}",
    "{{ Table1.selectedRows.forEach((row) => Api1.run(row)) }}",
    // nested trigger calls inside callbacks
    "{{Api1.run().then(() => Api2.run().then(() => showAlert('x')))}}",
    "{{Api1.run().then(() => { showAlert('a'); showAlert('b') })}}",
    // chained continuations beyond one
    "{{Api1.run().then(() => showAlert('a')).catch(() => showAlert('b'))}}",
    // promise composition
    "{{ Promise.all([Api1.run(), Api2.run()]) }}",
    "{{ new Promise((resolve) => resolve(Api1.run())) }}",
    // async code
    "{{ (async () => { await Api1.run() })() }}",
    "{{ await Api1.run() }}",
    // self invoking function
    "{{ (function() { return 1 })() }}",
    // two trigger calls in one expression
    "{{ Input1.text ? Api1.run() : Api2.run() }}",
  ];
  for text in programs {
    assert_eq!(classify(text), Classification::TriggerProgram, "{text}");
  }
}

#[test]
fn test_parse_failure_disables_selector() {
  let classification = classify("{{ Api1.run( }}");
  assert_eq!(classification, Classification::Unparsable);
  assert!(!classification.selector_enabled());
}

#[test]
fn test_deeply_nested_source_is_unparsable() {
  let text = format!("{{{{ {}1{} }}}}", "(".repeat(3_000), ")".repeat(3_000));
  assert_eq!(classify(&text), Classification::Unparsable);

  let text = format!("{{{{ Api1.run({}1{}) }}}}", "[".repeat(3_000), "]".repeat(3_000));
  assert_eq!(classify(&text), Classification::Unparsable);
}

#[test]
fn test_alert_then_interval_then_alert() {
  let text = "{{\n  showAlert('hi')\n  setInterval(() => {console.log('this is an interval')} , 7000, 'id')\n  showAlert('hello')\n    .then(() => {return Api1.data})\n  .then(() => clearInterval('id'))\n}}";
  let classification = classify(text);
  assert_eq!(classification, Classification::TriggerProgram);
  assert!(!classification.selector_enabled());
}

#[test]
fn test_for_each_with_nested_runs() {
  let text = r#"{{["UI Building", "Actions", "JS"].forEach((label, index) => {
      Api1.run((res, param) => {
        let CritLen = 0;
        res.map(issue => {
          issue.labels.map(label => {
            if (label.name === "Critical") {
              CritLen++;
            }
          });
        });
        storeValue("Bug-" + param.index + "", { x: param.label, critY: CritLen });
      }, undefined, {
        label: label,
        index: index
      });
    });}}"#;
  assert_eq!(classify(text), Classification::TriggerProgram);
}

#[test]
fn test_race_with_malformed_template_argument() {
  let text = "{{ (function(){ return Promise.race([ Api1.run({ name: 1 }), Api1.run({ name: 2 }) ]).then((res) => { showAlert(Winner: ${res.args.name}) }); })() }}";
  let classification = classify(text);
  assert_eq!(classification, Classification::Unparsable);
  assert!(!classification.selector_enabled());
}

#[test]
fn test_classification_is_idempotent() {
  let binding = Binding::new("{{Api1.run().then(() => showAlert('done'))}}").bound_to("Button1", "onClick");
  let first = classify_binding(&binding);
  let second = classify_binding(&binding);
  assert_eq!(first, second);
  assert_eq!(first, Classification::SimpleExpression);
}
