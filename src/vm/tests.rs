//! End-to-end VM tests: AST in, printed lines and globals out.

use pretty_assertions::assert_eq;

use crate::ast::{BinaryOp, Comprehension, ComprehensionClause, Expr, Program, Stmt};
use crate::error::RuntimeError;
use crate::span::Span;
use crate::vm::{Compiler, NativeFunction, Value, Vm, VmConfig};

fn compile_and_run_with(vm: &mut Vm, statements: Vec<Stmt>) -> Result<(), RuntimeError> {
    let module = Compiler::compile(&Program::new(statements)).expect("compile error");
    vm.capture_output();
    vm.execute(&module)
}

fn compile_and_run(statements: Vec<Stmt>) -> Result<Vec<String>, RuntimeError> {
    let mut vm = Vm::new();
    compile_and_run_with(&mut vm, statements)?;
    Ok(vm.take_output())
}

fn output_of(statements: Vec<Stmt>) -> Vec<String> {
    compile_and_run(statements).expect("vm error")
}

fn compile_and_get_global(statements: Vec<Stmt>, name: &str) -> Value {
    let mut vm = Vm::new();
    compile_and_run_with(&mut vm, statements).expect("vm error");
    vm.global(name).cloned().unwrap_or(Value::Absent)
}

fn bin(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
    Expr::binary(left, operator, right)
}

fn ints(values: &[i64]) -> Expr {
    Expr::list(values.iter().map(|n| Expr::int(*n)).collect())
}

fn clause(variable: &str, source: Expr) -> ComprehensionClause {
    ComprehensionClause::new(variable, source)
}

fn int_values(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

// --- Arithmetic ---

#[test]
fn test_vm_arithmetic() {
    let result = compile_and_get_global(
        vec![Stmt::let_(
            "x",
            bin(
                Expr::int(2),
                BinaryOp::Add,
                bin(Expr::int(3), BinaryOp::Multiply, Expr::int(4)),
            ),
        )],
        "x",
    );
    assert_eq!(result, Value::Int(14));
}

#[test]
fn test_vm_division_is_true_division() {
    let result = compile_and_get_global(
        vec![Stmt::let_("x", bin(Expr::int(7), BinaryOp::Divide, Expr::int(2)))],
        "x",
    );
    assert!(matches!(result, Value::Float(x) if x == 3.5));
}

#[test]
fn test_vm_arithmetic_matches_numeric_model() {
    let pairs: [(i64, i64); 4] = [(7, 2), (-3, 5), (10, -4), (0, 9)];
    for (a, b) in pairs {
        let ops = [
            (BinaryOp::Add, Value::Int(a + b)),
            (BinaryOp::Subtract, Value::Int(a - b)),
            (BinaryOp::Multiply, Value::Int(a * b)),
            (BinaryOp::Divide, Value::Float(a as f64 / b as f64)),
        ];
        for (operator, expected) in ops {
            let result = compile_and_get_global(
                vec![Stmt::let_("r", bin(Expr::int(a), operator, Expr::int(b)))],
                "r",
            );
            assert_eq!(result, expected, "{} {} {}", a, operator, b);
        }
    }
}

#[test]
fn test_vm_print_formats_values() {
    let output = output_of(vec![
        Stmt::print(bin(Expr::int(8), BinaryOp::Divide, Expr::int(2))),
        Stmt::print(bin(Expr::text("plasma"), BinaryOp::Add, Expr::text("script"))),
        Stmt::print(Expr::list(vec![
            Expr::int(1),
            Expr::text("a"),
            Expr::tuple(vec![Expr::int(2)]),
            Expr::mapping(vec![(Expr::text("k"), Expr::float(1.5))]),
        ])),
        Stmt::print(bin(Expr::int(3), BinaryOp::LessEqual, Expr::float(3.0))),
        Stmt::print(Expr::negate(bin(Expr::int(-7), BinaryOp::Modulo, Expr::int(3)))),
    ]);
    assert_eq!(
        output,
        vec![
            "4.0",
            "plasmascript",
            r#"[1, "a", (2,), {"k": 1.5}]"#,
            "true",
            "-2",
        ]
    );
}

// --- Functions and closures ---

#[test]
fn test_vm_function_call() {
    let result = compile_and_get_global(
        vec![
            Stmt::func(
                "add",
                &["a", "b"],
                vec![Stmt::ret(bin(Expr::var("a"), BinaryOp::Add, Expr::var("b")))],
            ),
            Stmt::let_("result", Expr::call("add", vec![Expr::int(3), Expr::int(4)])),
        ],
        "result",
    );
    assert_eq!(result, Value::Int(7));
}

#[test]
fn test_vm_recursive_fib() {
    let fib = Stmt::func(
        "fib",
        &["n"],
        vec![
            Stmt::if_(
                bin(Expr::var("n"), BinaryOp::Less, Expr::int(2)),
                vec![Stmt::ret(Expr::var("n"))],
                None,
            ),
            Stmt::ret(bin(
                Expr::call("fib", vec![bin(Expr::var("n"), BinaryOp::Subtract, Expr::int(1))]),
                BinaryOp::Add,
                Expr::call("fib", vec![bin(Expr::var("n"), BinaryOp::Subtract, Expr::int(2))]),
            )),
        ],
    );
    let result = compile_and_get_global(
        vec![fib, Stmt::let_("result", Expr::call("fib", vec![Expr::int(15)]))],
        "result",
    );
    assert_eq!(result, Value::Int(610));
}

#[test]
fn test_vm_nested_named_function_can_recurse() {
    let countdown = Stmt::func(
        "countdown",
        &["n"],
        vec![
            Stmt::if_(
                bin(Expr::var("n"), BinaryOp::Less, Expr::int(1)),
                vec![Stmt::ret(Expr::int(0))],
                None,
            ),
            Stmt::ret(bin(
                Expr::call(
                    "countdown",
                    vec![bin(Expr::var("n"), BinaryOp::Subtract, Expr::int(1))],
                ),
                BinaryOp::Add,
                Expr::int(1),
            )),
        ],
    );
    let output = output_of(vec![
        Stmt::func(
            "outer",
            &[],
            vec![countdown, Stmt::ret(Expr::call("countdown", vec![Expr::int(3)]))],
        ),
        Stmt::print(Expr::call("outer", vec![])),
    ]);
    assert_eq!(output, vec!["3"]);
}

#[test]
fn test_vm_closure_captures_by_value() {
    let output = output_of(vec![
        Stmt::let_("x", Expr::int(1)),
        Stmt::func("f", &[], vec![Stmt::ret(Expr::var("x"))]),
        Stmt::let_("x", Expr::int(2)),
        Stmt::print(Expr::call("f", vec![])),
        Stmt::print(Expr::var("x")),
    ]);
    assert_eq!(output, vec!["1", "2"]);
}

#[test]
fn test_vm_closure_ignores_later_local_writes() {
    let output = output_of(vec![
        Stmt::func(
            "outer",
            &[],
            vec![
                Stmt::let_("v", Expr::int(1)),
                Stmt::let_("get", Expr::lambda(&[], vec![Stmt::ret(Expr::var("v"))])),
                Stmt::let_("v", Expr::int(2)),
                Stmt::ret(Expr::call("get", vec![])),
            ],
        ),
        Stmt::print(Expr::call("outer", vec![])),
    ]);
    assert_eq!(output, vec!["1"]);
}

#[test]
fn test_vm_nested_closures_keep_captured_globals() {
    let outer = Stmt::func(
        "outer",
        &[],
        vec![
            Stmt::print(Expr::var("x")),
            Stmt::func("inner", &[], vec![Stmt::ret(Expr::var("x"))]),
            Stmt::print(Expr::call("inner", vec![])),
            Stmt::print(Expr::comprehension(Comprehension::list(
                Expr::var("x"),
                vec![clause("i", ints(&[0]))],
            ))),
            Stmt::print(Expr::call_expr(
                Expr::lambda(&[], vec![Stmt::ret(Expr::var("x"))]),
                vec![],
            )),
        ],
    );
    let output = output_of(vec![
        Stmt::let_("x", Expr::int(1)),
        outer,
        Stmt::let_("x", Expr::int(2)),
        Stmt::expr(Expr::call("outer", vec![])),
    ]);
    assert_eq!(output, vec!["1", "1", "[1]", "1"]);
}

#[test]
fn test_vm_nested_closure_sees_globals_defined_later() {
    let output = output_of(vec![
        Stmt::func(
            "outer",
            &[],
            vec![Stmt::ret(Expr::comprehension(Comprehension::list(
                Expr::call("helper", vec![Expr::var("i")]),
                vec![clause("i", ints(&[1, 2]))],
            )))],
        ),
        Stmt::func(
            "helper",
            &["v"],
            vec![Stmt::ret(bin(Expr::var("v"), BinaryOp::Multiply, Expr::int(10)))],
        ),
        Stmt::print(Expr::call("outer", vec![])),
    ]);
    assert_eq!(output, vec!["[10, 20]"]);
}

#[test]
fn test_vm_returned_closure_outlives_its_frame() {
    let make_adder = Stmt::func(
        "makeAdder",
        &["n"],
        vec![Stmt::ret(Expr::lambda(
            &["x"],
            vec![Stmt::ret(bin(Expr::var("x"), BinaryOp::Add, Expr::var("n")))],
        ))],
    );
    let output = output_of(vec![
        make_adder,
        Stmt::let_("add5", Expr::call("makeAdder", vec![Expr::int(5)])),
        Stmt::print(Expr::call("add5", vec![Expr::int(10)])),
        Stmt::print(Expr::call_expr(
            Expr::call("makeAdder", vec![Expr::int(1)]),
            vec![Expr::int(10)],
        )),
        Stmt::print(Expr::var("add5")),
        Stmt::print(Expr::var("makeAdder")),
    ]);
    assert_eq!(output, vec!["15", "11", "<lambda>", "<func makeAdder(n)>"]);
}

#[test]
fn test_vm_each_definition_makes_a_fresh_closure() {
    let adders = Comprehension::list(
        Expr::lambda(
            &["y"],
            vec![Stmt::ret(bin(Expr::var("y"), BinaryOp::Add, Expr::var("x")))],
        ),
        vec![clause("x", ints(&[1, 2, 3]))],
    );
    let output = output_of(vec![
        Stmt::let_("adders", Expr::comprehension(adders)),
        Stmt::for_in(
            "f",
            Expr::var("adders"),
            vec![Stmt::print(Expr::call("f", vec![Expr::int(10)]))],
        ),
    ]);
    assert_eq!(output, vec!["11", "12", "13"]);
}

#[test]
fn test_vm_missing_return_yields_absent() {
    let output = output_of(vec![
        Stmt::func("noop", &[], vec![Stmt::expr(Expr::int(1))]),
        Stmt::print(Expr::call("noop", vec![])),
    ]);
    assert_eq!(output, vec!["none"]);
}

#[test]
fn test_vm_globals_persist_across_modules() {
    let mut vm = Vm::new();
    compile_and_run_with(
        &mut vm,
        vec![Stmt::func(
            "twice",
            &["v"],
            vec![Stmt::ret(bin(Expr::var("v"), BinaryOp::Multiply, Expr::int(2)))],
        )],
    )
    .unwrap();
    compile_and_run_with(
        &mut vm,
        vec![
            Stmt::let_("pad", Expr::int(0)),
            Stmt::print(Expr::call("twice", vec![Expr::int(21)])),
        ],
    )
    .unwrap();
    assert_eq!(vm.take_output(), vec!["42"]);
}

// --- Comprehensions ---

#[test]
fn test_vm_comprehension_cartesian_product() {
    let element = bin(
        bin(Expr::var("a"), BinaryOp::Multiply, Expr::int(10)),
        BinaryOp::Add,
        Expr::var("b"),
    );
    let comprehension = Comprehension::list(
        element,
        vec![clause("a", ints(&[1, 2])), clause("b", ints(&[1, 2]))],
    );
    let result = compile_and_get_global(
        vec![Stmt::let_("r", Expr::comprehension(comprehension))],
        "r",
    );
    assert_eq!(result, Value::list(int_values(&[11, 12, 21, 22])));
}

#[test]
fn test_vm_set_comprehension_with_filter() {
    let comprehension = Comprehension::set(Expr::var("x"), vec![clause("x", ints(&[1, 2, 3, 4]))])
        .filter(bin(
            bin(Expr::var("x"), BinaryOp::Modulo, Expr::int(2)),
            BinaryOp::Equal,
            Expr::int(0),
        ));
    let result = compile_and_get_global(
        vec![Stmt::let_("r", Expr::comprehension(comprehension))],
        "r",
    );
    assert_eq!(result, Value::set_from(int_values(&[4, 2])).unwrap());
}

#[test]
fn test_vm_mapping_comprehension() {
    let comprehension = Comprehension::mapping(
        Expr::var("x"),
        bin(Expr::var("x"), BinaryOp::Multiply, Expr::var("x")),
        vec![clause("x", ints(&[1, 2, 3]))],
    );
    let output = output_of(vec![Stmt::print(Expr::comprehension(comprehension))]);
    assert_eq!(output, vec!["{1: 1, 2: 4, 3: 9}"]);
}

#[test]
fn test_vm_generator_is_restartable() {
    let generator = Comprehension::generator(
        bin(Expr::var("x"), BinaryOp::Add, Expr::int(1)),
        vec![clause("x", ints(&[1, 2, 3]))],
    );
    let replay = || {
        Stmt::print(Expr::comprehension(Comprehension::list(
            Expr::var("y"),
            vec![clause("y", Expr::var("g"))],
        )))
    };
    let output = output_of(vec![
        Stmt::let_("g", Expr::comprehension(generator)),
        replay(),
        replay(),
        Stmt::print(Expr::var("g")),
    ]);
    assert_eq!(output, vec!["[2, 3, 4]", "[2, 3, 4]", "<generator of 3>"]);
}

#[test]
fn test_vm_comprehension_sees_enclosing_locals() {
    let output = output_of(vec![
        Stmt::func(
            "scale",
            &["k"],
            vec![Stmt::ret(Expr::comprehension(Comprehension::list(
                bin(Expr::var("x"), BinaryOp::Multiply, Expr::var("k")),
                vec![clause("x", ints(&[1, 2]))],
            )))],
        ),
        Stmt::print(Expr::call("scale", vec![Expr::int(3)])),
    ]);
    assert_eq!(output, vec!["[3, 6]"]);
}

#[test]
fn test_vm_clause_sources_are_evaluated_before_binding() {
    // The second source names `a`, which resolves to the global, not the
    // first clause's variable.
    let comprehension = Comprehension::list(
        Expr::var("b"),
        vec![clause("a", ints(&[1, 2])), clause("b", Expr::var("a"))],
    );
    let output = output_of(vec![
        Stmt::let_("a", ints(&[10])),
        Stmt::print(Expr::comprehension(comprehension)),
    ]);
    assert_eq!(output, vec!["[10, 10]"]);
}

#[test]
fn test_vm_comprehension_over_text_and_mapping_keys() {
    let output = output_of(vec![
        Stmt::print(Expr::comprehension(Comprehension::list(
            Expr::var("c"),
            vec![clause("c", Expr::text("ab"))],
        ))),
        Stmt::print(Expr::comprehension(Comprehension::set(
            Expr::var("k"),
            vec![clause(
                "k",
                Expr::mapping(vec![(Expr::text("x"), Expr::int(1))]),
            )],
        ))),
    ]);
    assert_eq!(output, vec![r#"["a", "b"]"#, r#"{"x"}"#]);
}

// --- Control flow ---

#[test]
fn test_vm_if_else() {
    let result = compile_and_get_global(
        vec![
            Stmt::let_("x", Expr::int(10)),
            Stmt::if_(
                bin(Expr::var("x"), BinaryOp::Greater, Expr::int(5)),
                vec![Stmt::let_("y", Expr::int(1))],
                Some(vec![Stmt::let_("y", Expr::int(2))]),
            ),
        ],
        "y",
    );
    assert_eq!(result, Value::Int(1));
}

#[test]
fn test_vm_for_loop() {
    let result = compile_and_get_global(
        vec![
            Stmt::let_("total", Expr::int(0)),
            Stmt::for_in(
                "x",
                ints(&[1, 2, 3]),
                vec![Stmt::let_(
                    "total",
                    bin(Expr::var("total"), BinaryOp::Add, Expr::var("x")),
                )],
            ),
        ],
        "total",
    );
    assert_eq!(result, Value::Int(6));
}

#[test]
fn test_vm_return_from_inside_loop() {
    let first_even = Stmt::func(
        "firstEven",
        &["xs"],
        vec![
            Stmt::for_in(
                "x",
                Expr::var("xs"),
                vec![Stmt::if_(
                    bin(
                        bin(Expr::var("x"), BinaryOp::Modulo, Expr::int(2)),
                        BinaryOp::Equal,
                        Expr::int(0),
                    ),
                    vec![Stmt::ret(Expr::var("x"))],
                    None,
                )],
            ),
            Stmt::ret(Expr::negate(Expr::int(1))),
        ],
    );
    let mut vm = Vm::new();
    compile_and_run_with(
        &mut vm,
        vec![
            first_even,
            Stmt::print(Expr::call("firstEven", vec![ints(&[1, 3, 4, 5])])),
            Stmt::print(Expr::call("firstEven", vec![ints(&[1])])),
        ],
    )
    .unwrap();
    assert_eq!(vm.take_output(), vec!["4", "-1"]);
    assert!(vm.iter_stack.is_empty());
    assert!(vm.stack.is_empty());
}

// --- Halt ---

#[test]
fn test_vm_halt_at_top_level() {
    let output = output_of(vec![
        Stmt::print(Expr::int(1)),
        Stmt::halt(),
        Stmt::print(Expr::int(2)),
    ]);
    assert_eq!(output, vec!["1"]);
}

#[test]
fn test_vm_halt_inside_nested_call_stops_everything() {
    let mut vm = Vm::new();
    compile_and_run_with(
        &mut vm,
        vec![
            Stmt::func(
                "deep",
                &[],
                vec![
                    Stmt::print(Expr::text("before")),
                    Stmt::halt(),
                    Stmt::print(Expr::text("after")),
                ],
            ),
            Stmt::func(
                "outer",
                &[],
                vec![
                    Stmt::expr(Expr::call("deep", vec![])),
                    Stmt::print(Expr::text("outer after")),
                ],
            ),
            Stmt::expr(Expr::call("outer", vec![])),
            Stmt::print(Expr::text("top after")),
        ],
    )
    .expect("halt is not an error");
    assert_eq!(vm.take_output(), vec!["before"]);
    assert!(vm.frames.is_empty());
}

#[test]
fn test_vm_halt_inside_native_callback() {
    let callback = Expr::lambda(
        &["x"],
        vec![
            Stmt::print(Expr::var("x")),
            Stmt::if_(
                bin(Expr::var("x"), BinaryOp::Equal, Expr::int(2)),
                vec![Stmt::halt()],
                None,
            ),
        ],
    );
    let output = output_of(vec![
        Stmt::expr(Expr::call("forEach", vec![ints(&[1, 2, 3]), callback])),
        Stmt::print(Expr::text("unreachable")),
    ]);
    assert_eq!(output, vec!["1", "2"]);
}

#[test]
fn test_vm_halt_announcement() {
    let mut vm = Vm::with_config(VmConfig::default().with_announce_halt(true));
    compile_and_run_with(&mut vm, vec![Stmt::print(Expr::int(1)), Stmt::halt()]).unwrap();
    assert_eq!(vm.take_output(), vec!["1", "Program finished."]);
}

// --- Natives ---

#[test]
fn test_vm_map_and_filter() {
    let output = output_of(vec![
        Stmt::print(Expr::call(
            "map",
            vec![
                ints(&[1, 2, 3]),
                Expr::lambda(
                    &["x"],
                    vec![Stmt::ret(bin(Expr::var("x"), BinaryOp::Multiply, Expr::int(2)))],
                ),
            ],
        )),
        Stmt::print(Expr::call(
            "filter",
            vec![
                ints(&[1, 2, 3, 4]),
                Expr::lambda(
                    &["x"],
                    vec![Stmt::ret(bin(
                        bin(Expr::var("x"), BinaryOp::Modulo, Expr::int(2)),
                        BinaryOp::Equal,
                        Expr::int(0),
                    ))],
                ),
            ],
        )),
    ]);
    assert_eq!(output, vec!["[2, 4, 6]", "[2, 4]"]);
}

#[test]
fn test_vm_host_function_registration() {
    let mut vm = Vm::new();
    vm.register_native(NativeFunction::new("answer", 0, |_, _| Ok(Value::Int(42))));
    compile_and_run_with(&mut vm, vec![Stmt::print(Expr::call("answer", vec![]))]).unwrap();
    assert_eq!(vm.take_output(), vec!["42"]);
}

// --- Faults ---

#[test]
fn test_vm_arity_mismatch() {
    let mut vm = Vm::new();
    let err = compile_and_run_with(
        &mut vm,
        vec![
            Stmt::func(
                "add",
                &["a", "b"],
                vec![Stmt::ret(bin(Expr::var("a"), BinaryOp::Add, Expr::var("b")))],
            ),
            Stmt::print(Expr::call("add", vec![Expr::int(1)])),
        ],
    )
    .unwrap_err();

    assert!(matches!(
        err.root(),
        RuntimeError::WrongArity { name, expected: 2, got: 1 } if name == "add"
    ));
    assert!(err.to_string().contains("CALL add 1"));
    assert!(vm.take_output().is_empty());
    assert!(vm.frames.is_empty());
    assert!(vm.global("a").is_none());
}

#[test]
fn test_vm_undefined_variable() {
    let err = compile_and_run(vec![Stmt::print(Expr::var("ghost"))]).unwrap_err();
    assert!(matches!(err.root(), RuntimeError::UndefinedVariable(name) if name == "ghost"));
    assert_eq!(err.offset(), Some(0));
    assert!(err.to_string().contains("LOAD_VAR ghost"));
}

#[test]
fn test_vm_undefined_function() {
    let err = compile_and_run(vec![Stmt::expr(Expr::call("nope", vec![]))]).unwrap_err();
    assert!(matches!(err.root(), RuntimeError::UndefinedFunction(name) if name == "nope"));
}

#[test]
fn test_vm_not_callable() {
    let err = compile_and_run(vec![
        Stmt::let_("n", Expr::int(3)),
        Stmt::expr(Expr::call("n", vec![])),
    ])
    .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::NotCallable("int")));
}

#[test]
fn test_vm_type_fault_reports_source_location() {
    let expr = bin(Expr::int(1), BinaryOp::Add, Expr::text("a")).at(Span::new(20, 27, 3, 9));
    let err = compile_and_run(vec![Stmt::print(expr)]).unwrap_err();
    assert!(matches!(err.root(), RuntimeError::TypeError(_)));
    assert_eq!(err.span(), Some(Span::new(20, 27, 3, 9)));
    assert_eq!(err.offset(), Some(2));
}

#[test]
fn test_vm_not_iterable() {
    let err = compile_and_run(vec![Stmt::for_in("x", Expr::int(5), vec![])]).unwrap_err();
    assert!(matches!(err.root(), RuntimeError::NotIterable("int")));

    let err = compile_and_run(vec![Stmt::print(Expr::comprehension(Comprehension::list(
        Expr::var("x"),
        vec![clause("x", Expr::bool(true))],
    )))])
    .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::NotIterable("bool")));
}

#[test]
fn test_vm_unhashable_set_element() {
    let err = compile_and_run(vec![Stmt::print(Expr::set(vec![ints(&[1])]))]).unwrap_err();
    assert!(matches!(err.root(), RuntimeError::Unhashable("list")));
}

#[test]
fn test_vm_host_fault_propagates() {
    let mut vm = Vm::new();
    vm.register_native(NativeFunction::new("boom", 0, |_, _| {
        Err(RuntimeError::host("boom", "kaboom"))
    }));
    let err = compile_and_run_with(&mut vm, vec![Stmt::expr(Expr::call("boom", vec![]))])
        .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::Host { name, .. } if name == "boom"));
}

#[test]
fn test_vm_fault_inside_callback_reports_innermost_instruction() {
    let callback = Expr::lambda(
        &["x"],
        vec![Stmt::ret(bin(Expr::var("x"), BinaryOp::Divide, Expr::int(0)))],
    );
    let err = compile_and_run(vec![Stmt::print(Expr::call(
        "map",
        vec![ints(&[1]), callback],
    ))])
    .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::DivisionByZero));
    assert!(err.to_string().contains("BINARY_OP /"));
}

#[test]
fn test_vm_call_depth_is_bounded() {
    let mut vm = Vm::with_config(VmConfig::default().with_max_call_depth(50));
    let err = compile_and_run_with(
        &mut vm,
        vec![
            Stmt::func(
                "forever",
                &["n"],
                vec![Stmt::ret(Expr::call(
                    "forever",
                    vec![bin(Expr::var("n"), BinaryOp::Add, Expr::int(1))],
                ))],
            ),
            Stmt::expr(Expr::call("forever", vec![Expr::int(0)])),
        ],
    )
    .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::CallDepthExceeded(50)));
    assert!(vm.frames.is_empty());
}

fn recurse_through_map() -> Stmt {
    Stmt::func(
        "r",
        &["n"],
        vec![
            Stmt::if_(
                bin(Expr::var("n"), BinaryOp::Less, Expr::int(1)),
                vec![Stmt::ret(Expr::int(0))],
                None,
            ),
            Stmt::ret(Expr::call(
                "map",
                vec![
                    Expr::list(vec![bin(Expr::var("n"), BinaryOp::Subtract, Expr::int(1))]),
                    Expr::var("r"),
                ],
            )),
        ],
    )
}

#[test]
fn test_vm_recursion_through_native_is_bounded() {
    let mut vm = Vm::new();
    let err = compile_and_run_with(
        &mut vm,
        vec![
            recurse_through_map(),
            Stmt::expr(Expr::call("r", vec![Expr::int(300)])),
        ],
    )
    .unwrap_err();
    assert!(matches!(err.root(), RuntimeError::NativeDepthExceeded(64)));
    assert!(vm.frames.is_empty());

    // The engine is usable again after the fault.
    compile_and_run_with(
        &mut vm,
        vec![Stmt::print(Expr::call("r", vec![Expr::int(3)]))],
    )
    .unwrap();
    assert_eq!(vm.take_output(), vec!["[[[0]]]"]);
}

#[test]
fn test_vm_native_depth_is_configurable() {
    let program = |n: i64| {
        vec![
            recurse_through_map(),
            Stmt::expr(Expr::call("r", vec![Expr::int(n)])),
        ]
    };
    let mut vm = Vm::with_config(VmConfig::default().with_max_native_depth(4));
    compile_and_run_with(&mut vm, program(4)).expect("four levels fit");
    let err = compile_and_run_with(&mut vm, program(5)).unwrap_err();
    assert!(matches!(err.root(), RuntimeError::NativeDepthExceeded(4)));
}

// --- Determinism ---

#[test]
fn test_recompilation_is_identical() {
    let program = Program::new(vec![
        Stmt::let_("xs", ints(&[3, 1, 2])),
        Stmt::func(
            "sq",
            &["v"],
            vec![Stmt::ret(bin(Expr::var("v"), BinaryOp::Multiply, Expr::var("v")))],
        ),
        Stmt::print(Expr::comprehension(
            Comprehension::mapping(
                Expr::var("x"),
                Expr::call("sq", vec![Expr::var("x")]),
                vec![clause("x", Expr::var("xs"))],
            )
            .filter(bin(Expr::var("x"), BinaryOp::NotEqual, Expr::float(2.0))),
        )),
        Stmt::halt(),
    ]);
    let first = Compiler::compile(&program).unwrap();
    let second = Compiler::compile(&program).unwrap();
    assert_eq!(first.constants(), second.constants());
    assert_eq!(first.instructions(), second.instructions());
    assert_eq!(first, second);
}
