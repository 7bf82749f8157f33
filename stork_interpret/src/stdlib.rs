use log::debug;

use crate::{
    error::{host_error, ErrorMsg, Exception},
    host::Sandbox,
    interpret::Interpreter,
    run,
    types::{NativeFunc, Value},
};

/// Library functions every program can call, written in Stork on
/// top of the host escape. Loaded before any user code.
pub const PRELUDE: &str = r##"
fn print(arg) ( raw_python_exec "print(#__arg#)" )
fn eq(a b) ( raw_python_eval "1 if #__a# == #__b# else 0" )
fn neq(a b) ( raw_python_eval "0 if #__a# == #__b# else 1" )
fn lt(a b) ( raw_python_eval "1 if #__a# < #__b# else 0" )
fn gt(a b) ( raw_python_eval "1 if #__a# > #__b# else 0" )
fn not(v) ( if v ( 0 ) else ( 1 ) )
fn assert_eq(vb vl) (
    if call neq(vb vl) (
        raw_python_exec "raise Exception('Assertion failed: ' + str(#__vb#) + ' does not equal ' + str(#__vl#))"
    )
)
fn access(arr idx) ( raw_python_eval "#__arr#[#__idx#]" )
fn len(v) ( raw_python_eval "len(#__v#)" )
fn str(v) ( raw_python_eval "str(#__v#)" )
"##;

/// Defines the prelude functions in the interpreter
pub fn load_prelude(interpreter: &mut Interpreter) -> Result<(), Vec<Exception>> {
    run(PRELUDE, interpreter)?;
    debug!("Loaded prelude");
    Ok(())
}

pub fn init_natives(sandbox: &mut Sandbox) {
    // print(args...)
    sandbox.register(NativeFunc {
        name: "print".to_string(),
        arity: None,
        body: |sandbox, args| {
            let line = args
                .iter()
                .map(Value::to_string)
                .collect::<Vec<String>>()
                .join(" ");
            sandbox.write_line(line);
            Ok(Value::Null)
        },
    });
    // str(value)
    sandbox.register(NativeFunc {
        name: "str".to_string(),
        arity: Some(1),
        body: |_, args| Ok(Value::Str(args[0].to_string())),
    });
    // repr(value)
    sandbox.register(NativeFunc {
        name: "repr".to_string(),
        arity: Some(1),
        body: |_, args| Ok(Value::Str(args[0].repr())),
    });
    // len(value)
    sandbox.register(NativeFunc {
        name: "len".to_string(),
        arity: Some(1),
        body: |_, args| {
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::Array(values) => values.len(),
                value => return Err(host_error(ErrorMsg::InvalidArgs, format!("len: {}", value.type_name()))),
            };
            i64::try_from(len)
                .map(Value::Int)
                .map_err(|_| host_error(ErrorMsg::IntegerOverflow, "len"))
        },
    });
    // int(value)
    sandbox.register(NativeFunc {
        name: "int".to_string(),
        arity: Some(1),
        body: |_, args| match &args[0] {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Float(n) if n.is_finite() && n.abs() < i64::MAX as f64 => {
                Ok(Value::Int(n.trunc() as i64))
            }
            Value::Str(s) => s
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|_| host_error(ErrorMsg::InvalidArgs, format!("int: {s:?}"))),
            value => Err(host_error(ErrorMsg::InvalidArgs, format!("int: {value}"))),
        },
    });
    // float(value)
    sandbox.register(NativeFunc {
        name: "float".to_string(),
        arity: Some(1),
        body: |_, args| match &args[0] {
            Value::Int(n) => Ok(Value::Float(*n as f64)),
            Value::Float(n) => Ok(Value::Float(*n)),
            Value::Str(s) => s
                .trim()
                .parse()
                .map(Value::Float)
                .map_err(|_| host_error(ErrorMsg::InvalidArgs, format!("float: {s:?}"))),
            value => Err(host_error(ErrorMsg::InvalidArgs, format!("float: {}", value.type_name()))),
        },
    });
    // abs(value)
    sandbox.register(NativeFunc {
        name: "abs".to_string(),
        arity: Some(1),
        body: |_, args| match &args[0] {
            Value::Int(n) => n
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| host_error(ErrorMsg::IntegerOverflow, "abs")),
            Value::Float(n) => Ok(Value::Float(n.abs())),
            value => Err(host_error(ErrorMsg::InvalidArgs, format!("abs: {}", value.type_name()))),
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Host, Output};

    fn prelude() -> (Interpreter, Output) {
        let (sandbox, output) = Sandbox::captured();
        let mut interpreter = Interpreter::new(Box::new(sandbox));
        load_prelude(&mut interpreter).expect("failed to load prelude");
        (interpreter, output)
    }

    fn last(interpreter: &mut Interpreter, source: &str) -> Value {
        run(source, interpreter)
            .expect("failed to run source")
            .pop()
            .unwrap_or(Value::Null)
    }

    #[test]
    fn prelude_defines_everything() {
        let (interpreter, _) = prelude();
        for name in [
            "print", "eq", "neq", "lt", "gt", "not", "assert_eq", "access", "len", "str",
        ] {
            assert!(interpreter.env.get_func(name).is_ok(), "{name} is not defined");
        }
        assert_eq!(interpreter.pos(), interpreter.tokens().len());
    }

    #[test]
    fn print() {
        let (mut interpreter, output) = prelude();
        last(
            &mut interpreter,
            "call print('hello') call print(1 + 2) call print(array(1 'a')) call print(6 / 4)",
        );
        assert_eq!(output.take(), vec!["hello", "3", "[1, 'a']", "1.5"]);
    }

    #[test]
    fn comparisons() {
        let (mut interpreter, _) = prelude();
        assert_eq!(last(&mut interpreter, "call eq(1 1)"), Value::Int(1));
        assert_eq!(last(&mut interpreter, "call eq('a' 'b')"), Value::Int(0));
        assert_eq!(last(&mut interpreter, "call neq(1 2)"), Value::Int(1));
        assert_eq!(last(&mut interpreter, "call lt(1 2)"), Value::Int(1));
        assert_eq!(last(&mut interpreter, "call gt(1 2)"), Value::Int(0));
        assert_eq!(last(&mut interpreter, "call not(0)"), Value::Int(1));
        assert_eq!(last(&mut interpreter, "call not('x')"), Value::Int(0));
    }

    #[test]
    fn collections() {
        let (mut interpreter, _) = prelude();
        last(&mut interpreter, "set arr = array(10 20 30)");
        assert_eq!(last(&mut interpreter, "call access(arr 1)"), Value::Int(20));
        assert_eq!(last(&mut interpreter, "call access(arr 0 - 1)"), Value::Int(30));
        assert_eq!(last(&mut interpreter, "call len(arr)"), Value::Int(3));
        assert_eq!(last(&mut interpreter, "call len('four')"), Value::Int(4));
        assert_eq!(
            last(&mut interpreter, "call str(2.5)"),
            Value::Str("2.5".to_string())
        );
        assert!(run("call access(arr 3)", &mut interpreter).is_err());
    }

    #[test]
    fn assert_eq() {
        let (mut interpreter, _) = prelude();
        assert_eq!(last(&mut interpreter, "call assert_eq(2 1 + 1)"), Value::Null);
        let errors = run("call assert_eq(1 2)", &mut interpreter).unwrap_err();
        assert_eq!(
            errors,
            vec![Exception::Host(
                "Host error: exception raised, Exception: Assertion failed: 1 does not equal 2"
                    .to_string()
            )]
        );
    }

    #[test]
    fn natives() {
        let (mut sandbox, _) = Sandbox::captured();
        assert_eq!(sandbox.eval("int('12') + int(2.9)"), Ok(Value::Int(14)));
        assert_eq!(sandbox.eval("float(1)"), Ok(Value::Float(1.0)));
        assert_eq!(sandbox.eval("abs(0 - 3)"), Ok(Value::Int(3)));
        assert_eq!(sandbox.eval("repr('a')"), Ok(Value::Str("'a'".to_string())));
        assert!(sandbox.eval("len(1)").is_err());
        assert!(sandbox.eval("int('x')").is_err());
    }
}
