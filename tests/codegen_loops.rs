mod common;

use common::*;
use tailc::compiler::codegen::codegen_module;
use tailc::compiler::ir::*;
use tailc::compiler::module::Export;
use tailc::options::CodegenOptions;

#[test]
fn accumulator_becomes_a_while_loop() {
    let mut unit = unit(vec![recursive(vec![("sum", sum())])]);
    unit.exports.push(Export {
        ident: Ident::from("sum"),
        public_name: None,
        module: None,
    });
    let js = render(&unit);
    assert!(!js.contains("sum("), "recursive call survived: {}", js);

    insta::assert_snapshot!(js, @r###"
    const sum = $copy_n => $copy_acc => {
      let $sum_n = $copy_n;
      let $sum_acc = $copy_acc;
      while (true) {
        const n = $sum_n;
        const acc = $sum_acc;
        if (n === 0) {
          return acc;
        }
        $sum_n = n - 1;
        $sum_acc = acc + n;
        continue;
      }
    };
    export {sum};
    "###);
}

#[test]
fn mutual_recursion_shares_one_dispatcher() {
    let unit = unit(vec![recursive(vec![
        ("isEven", parity(true, "isOdd")),
        ("isOdd", parity(false, "isEven")),
    ])]);

    insta::assert_snapshot!(render(&unit), @r###"
    const $isEven_isOdd = ($isEven_isOdd_fn, $isEven_isOdd_0) => {
      while (true) {
        if ($isEven_isOdd_fn === 0) {
          const n = $isEven_isOdd_0;
          if (n === 0) {
            return true;
          }
          $isEven_isOdd_fn = 1;
          $isEven_isOdd_0 = n - 1;
          continue;
        }
        const n$1 = $isEven_isOdd_0;
        if (n$1 === 0) {
          return false;
        }
        $isEven_isOdd_fn = 0;
        $isEven_isOdd_0 = n$1 - 1;
        continue;
      }
    };
    const isEven = $copy_n => $isEven_isOdd(0, $copy_n);
    const isOdd = $copy_n$1 => $isEven_isOdd(1, $copy_n$1);
    "###);
}

#[test]
fn local_loop_closes_over_its_scope() {
    // count limit = letrec go i = if i >= limit then { done: i } else go (i + 1) in go 0
    let go = lambda(
        &[("i", 2)],
        if_else(
            make_op2(BinaryOp::Gte, make_local("i", 2), make_local("limit", 0)),
            make_record(vec![("done", make_local("i", 2))]),
            call(make_local("go", 1), vec![add(make_local("i", 2), make_int(1))]),
        ),
    );
    let count = lambda(
        &[("limit", 0)],
        make_letrec(1, vec![("go", go)], call(make_local("go", 1), vec![make_int(0)])),
    );

    insta::assert_snapshot!(render(&unit(vec![group(vec![("count", count)])])), @r###"
    const count = limit => {
      const go = $copy_i => {
        let $go_i = $copy_i;
        while (true) {
          const i = $go_i;
          if (i >= limit) {
            return { done: i };
          }
          $go_i = i + 1;
          continue;
        }
      };
      return go(0);
    };
    "###);
}

#[test]
fn non_tail_recursion_stays_a_call() {
    // f x = g (f (x - 1))
    let f = lambda(
        &[("x", 0)],
        call(
            main_var("g"),
            vec![call(main_var("f"), vec![sub(make_local("x", 0), make_int(1))])],
        ),
    );

    insta::assert_snapshot!(render(&unit(vec![recursive(vec![("f", f)])])), @"const f = x => g(f(x - 1));");
}

#[test]
fn calls_outside_the_group_are_not_jumps() {
    // loop n = if n == 0 then done n else loop (n - 1)
    let body = lambda(
        &[("n", 0)],
        if_else(
            eq(make_local("n", 0), make_int(0)),
            call(main_var("done"), vec![make_local("n", 0)]),
            call(main_var("loop"), vec![sub(make_local("n", 0), make_int(1))]),
        ),
    );

    insta::assert_snapshot!(render(&unit(vec![recursive(vec![("loop", body)])])), @r###"
    const loop = $copy_n => {
      let $loop_n = $copy_n;
      while (true) {
        const n = $loop_n;
        if (n === 0) {
          return done(n);
        }
        $loop_n = n - 1;
        continue;
      }
    };
    "###);
}

#[test]
fn disabled_tco_keeps_the_recursive_call() {
    let unit = unit(vec![recursive(vec![("sum", sum())])]);
    let options = CodegenOptions {
        tco: false,
        ..CodegenOptions::default()
    };

    insta::assert_snapshot!(codegen_module(&unit, &options).to_string(), @r###"
    const sum = n => acc => {
      if (n === 0) {
        return acc;
      }
      return sum(n - 1)(acc + n);
    };
    "###);
}

#[test]
fn lowering_is_deterministic() {
    let unit = unit(vec![
        recursive(vec![("sum", sum())]),
        recursive(vec![
            ("isEven", parity(true, "isOdd")),
            ("isOdd", parity(false, "isEven")),
        ]),
    ]);
    assert_eq!(render(&unit), render(&unit));
}

#[test]
fn failures_throw_and_simple_branches_are_ternaries() {
    // partial x = if x == 0 then 1 else fail
    let partial = lambda(
        &[("x", 0)],
        if_else(eq(make_local("x", 0), make_int(0)), make_int(1), make_fail("Failed pattern match")),
    );
    // sign x = abs (if x < 0 then -1 else 1)
    let sign = lambda(
        &[("x", 0)],
        call(
            main_var("abs"),
            vec![if_else(
                make_op2(BinaryOp::Lt, make_local("x", 0), make_int(0)),
                make_int(-1),
                make_int(1),
            )],
        ),
    );

    insta::assert_snapshot!(render(&unit(vec![group(vec![("partial", partial)]), group(vec![("sign", sign)])])), @r###"
    const partial = x => {
      if (x === 0) {
        return 1;
      }
      throw new Error("Failed pattern match");
    };
    const sign = x => abs(x < 0 ? -1 : 1);
    "###);
}

#[test]
fn effects_run_in_sequence() {
    let main = Expr::new(Syntax::EffectBind(
        None,
        Level(0),
        main_var("flush"),
        Expr::new(Syntax::EffectBind(
            Some(Ident::from("line")),
            Level(1),
            main_var("read"),
            Expr::new(Syntax::EffectPure(make_local("line", 1))),
        )),
    ));

    insta::assert_snapshot!(render(&unit(vec![group(vec![("main", main)])])), @r###"
    const main = () => {
      flush();
      const line = read();
      return line;
    };
    "###);
}

#[test]
fn reserved_words_are_escaped() {
    let id = lambda(&[("class", 0)], make_local("class", 0));
    insta::assert_snapshot!(render(&unit(vec![group(vec![("id", id)])])), @"const id = $$class => $$class;");
}

#[test]
fn module_imports_and_exports() {
    let mut unit = unit(vec![
        group(vec![("main", call(main_var("log"), vec![make_string("hi")]))]),
        group(vec![(
            "fallback",
            call(make_var("Data.Maybe", "fromMaybe"), vec![make_int(0)]),
        )]),
    ]);
    unit.imports.push(ModuleName::from("Data.Maybe"));
    unit.foreign.push(Ident::from("log"));
    unit.exports = vec![
        Export {
            ident: Ident::from("main"),
            public_name: None,
            module: None,
        },
        Export {
            ident: Ident::from("fallback"),
            public_name: Some(Ident::from("orZero")),
            module: None,
        },
        Export {
            ident: Ident::from("fromMaybe"),
            public_name: None,
            module: Some(ModuleName::from("Data.Maybe")),
        },
        Export {
            ident: Ident::from("log"),
            public_name: None,
            module: None,
        },
    ];

    insta::assert_snapshot!(render(&unit), @r###"
    import * as Data$dMaybe from "../Data.Maybe/index.js";
    import * as $foreign from "./foreign.js";
    const main = $foreign.log("hi");
    const fallback = Data$dMaybe.fromMaybe(0);
    export {main, fallback as orZero};
    export {fromMaybe} from "../Data.Maybe/index.js";
    export {log} from "./foreign.js";
    "###);
}

#[test]
fn locals_never_reuse_module_names() {
    // main = \sum -> sum
    let main = lambda(&[("sum", 0)], make_local("sum", 0));
    let unit = unit(vec![
        recursive(vec![("sum", sum())]),
        group(vec![("main", main)]),
    ]);
    let js = render(&unit);
    assert!(js.contains("const main = sum$1 => sum$1;"), "{}", js);
}

#[test]
fn unqualified_self_call_becomes_a_loop() {
    let js = render(&unit(vec![recursive(vec![("f", countdown(bare_var("f")))])]));
    assert!(js.contains("while (true)"), "{}", js);
    assert!(!js.contains("f(x - 1)"), "recursive call survived: {}", js);
    assert!(js.contains("$f_x = x - 1;"), "{}", js);
}

#[test]
fn dispatchers_of_separate_groups_never_clash() {
    // {a_b, c} and {a, b_c} both join their members into `a_b_c`.
    let unit = unit(vec![
        recursive(vec![("a_b", parity(true, "c")), ("c", parity(false, "a_b"))]),
        recursive(vec![("a", parity(true, "b_c")), ("b_c", parity(false, "a"))]),
    ]);
    let js = render(&unit);

    assert_eq!(js.matches("const $a_b_c = ").count(), 1, "{}", js);
    assert_eq!(js.matches("const $a_b_c$1 = ").count(), 1, "{}", js);
    assert!(js.contains("const a_b = $copy_n => $a_b_c(0, $copy_n);"), "{}", js);
    assert!(js.contains("const c = $copy_n$1 => $a_b_c(1, $copy_n$1);"), "{}", js);
    assert!(js.contains("const a = $copy_n => $a_b_c$1(0, $copy_n);"), "{}", js);
    assert!(js.contains("const b_c = $copy_n$1 => $a_b_c$1(1, $copy_n$1);"), "{}", js);
}

#[test]
fn local_mutual_recursion_shares_one_dispatcher() {
    // check n = letrec even k = if k == 0 then true else odd (k - 1)
    //                  odd k = if k == 0 then false else even (k - 1)
    //           in even n
    let member = |base: bool, other: &str| {
        lambda(
            &[("k", 2)],
            if_else(
                eq(make_local("k", 2), make_int(0)),
                make_boolean(base),
                call(make_local(other, 1), vec![sub(make_local("k", 2), make_int(1))]),
            ),
        )
    };
    let check = lambda(
        &[("n", 0)],
        make_letrec(
            1,
            vec![("even", member(true, "odd")), ("odd", member(false, "even"))],
            call(make_local("even", 1), vec![make_local("n", 0)]),
        ),
    );

    insta::assert_snapshot!(render(&unit(vec![group(vec![("check", check)])])), @r###"
    const check = n => {
      const $even_odd = ($even_odd_fn, $even_odd_0) => {
        while (true) {
          if ($even_odd_fn === 0) {
            const k = $even_odd_0;
            if (k === 0) {
              return true;
            }
            $even_odd_fn = 1;
            $even_odd_0 = k - 1;
            continue;
          }
          const k$1 = $even_odd_0;
          if (k$1 === 0) {
            return false;
          }
          $even_odd_fn = 0;
          $even_odd_0 = k$1 - 1;
          continue;
        }
      };
      const even = $copy_k => $even_odd(0, $copy_k);
      const odd = $copy_k$1 => $even_odd(1, $copy_k$1);
      return even(n);
    };
    "###);
}

#[test]
fn group_members_of_different_arities_share_the_widest_slots() {
    // f x = g x 0
    // g x acc = if x == 0 then acc else f (x - 1)
    let f = lambda(&[("x", 0)], call(main_var("g"), vec![make_local("x", 0), make_int(0)]));
    let g = lambda(
        &[("x", 0), ("acc", 1)],
        if_else(
            eq(make_local("x", 0), make_int(0)),
            make_local("acc", 1),
            call(main_var("f"), vec![sub(make_local("x", 0), make_int(1))]),
        ),
    );

    insta::assert_snapshot!(render(&unit(vec![recursive(vec![("f", f), ("g", g)])])), @r###"
    const $f_g = ($f_g_fn, $f_g_0, $f_g_1) => {
      while (true) {
        if ($f_g_fn === 0) {
          const x = $f_g_0;
          $f_g_fn = 1;
          $f_g_0 = x;
          $f_g_1 = 0;
          continue;
        }
        const x$1 = $f_g_0;
        const acc = $f_g_1;
        if (x$1 === 0) {
          return acc;
        }
        $f_g_fn = 0;
        $f_g_0 = x$1 - 1;
        continue;
      }
    };
    const f = $copy_x => $f_g(0, $copy_x);
    const g = $copy_x$1 => $copy_acc => $f_g(1, $copy_x$1, $copy_acc);
    "###);
}

#[test]
fn primed_names_are_escaped_and_exported_under_their_own_name() {
    // go' x = x
    let mut unit = unit(vec![group(vec![("go'", lambda(&[("x", 0)], make_local("x", 0)))])]);
    unit.exports.push(Export {
        ident: Ident::from("go'"),
        public_name: None,
        module: None,
    });

    insta::assert_snapshot!(render(&unit), @r###"
    const go$p = x => x;
    export {go$p as "go'"};
    "###);
}
