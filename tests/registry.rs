use std::io::Cursor;

use streamrpc::{Args, Handler, Registry, RegistryError, RpcClass, Service, StrError, Value};

async fn echo(args: Args) -> Result<Vec<Value>, StrError> {
    Ok(args.into_inner())
}

async fn source(_args: Args) -> Result<Cursor<Vec<u8>>, StrError> {
    Ok(Cursor::new(Vec::new()))
}

async fn sink(_args: Args) -> Result<tokio::io::Sink, StrError> {
    Ok(tokio::io::sink())
}

#[test]
fn methods_are_qualified_by_service_name() {
    let mut builder = Registry::builder();
    builder
        .register("Files", Service::new().normal("Stat", echo).read("Open", source))
        .expect("register Files")
        .register("Logs", Service::new().write("Append", sink))
        .expect("register Logs");
    let registry = builder.build();

    assert_eq!(registry.len(), 3);
    let capabilities = registry.capabilities();
    assert_eq!(capabilities.get("Files.Stat"), Some(&RpcClass::Normal));
    assert_eq!(capabilities.get("Files.Open"), Some(&RpcClass::ReadStream));
    assert_eq!(capabilities.get("Logs.Append"), Some(&RpcClass::WriteStream));

    let method = registry.get("Files.Open").expect("Files.Open");
    assert_eq!(method.name(), "Files.Open");
    assert!(matches!(method.handler(), Handler::Read(_)));
    assert!(registry.get("Open").is_none());
}

#[test]
fn second_registration_of_a_name_is_rejected() {
    let mut builder = Registry::builder();
    builder.register("Files", Service::new().normal("Stat", echo)).expect("first");

    let err = builder
        .register("Files", Service::new().normal("Other", echo))
        .err()
        .expect("second registration");
    assert_eq!(err, RegistryError::AlreadyRegistered("Files".to_string()));
    assert_eq!(err.to_string(), "already registered Files");

    let registry = builder.build();
    assert_eq!(registry.len(), 1);
    assert!(registry.get("Files.Other").is_none());
}

#[test]
fn invalid_names_are_rejected() {
    let mut builder = Registry::builder();

    let err = builder.register("", Service::new()).err();
    assert_eq!(err, Some(RegistryError::InvalidServiceName(String::new())));

    let err = builder.register("a.b", Service::new()).err();
    assert_eq!(err, Some(RegistryError::InvalidServiceName("a.b".to_string())));

    let err = builder.register("Files", Service::new().normal("x.y", echo)).err();
    assert_eq!(err, Some(RegistryError::InvalidMethodName("x.y".to_string())));

    // A failed registration leaves the service name free.
    builder.register("Files", Service::new().normal("Stat", echo)).expect("register Files");
}

#[test]
fn failed_registration_is_all_or_nothing() {
    let mut builder = Registry::builder();
    let service = Service::new().normal("Stat", echo).normal("Read", echo).read("Stat", source);

    let err = builder.register("Files", service).err();
    assert_eq!(err, Some(RegistryError::DuplicateMethod("Files.Stat".to_string())));
    assert!(builder.build().is_empty());
}

#[test]
fn prefix_convention_selects_class() {
    let service = Service::new()
        .method("Normal_Stat", Handler::normal(echo))
        .method("Read_Open", Handler::read(source))
        .method("Write_Append", Handler::write(sink))
        // Prefix and handler disagree.
        .method("Read_Mismatch", Handler::normal(echo))
        // No recognised prefix.
        .method("helper", Handler::normal(echo));

    let mut builder = Registry::builder();
    builder.register("Files", service).expect("register Files");
    let registry = builder.build();

    let names: Vec<&str> = registry.iter().map(|m| m.name()).collect();
    assert_eq!(names, ["Files.Append", "Files.Open", "Files.Stat"]);
    assert_eq!(registry.get("Files.Open").map(|m| m.class()), Some(RpcClass::ReadStream));
}

#[test]
fn method_name_prefixes() {
    assert_eq!(RpcClass::from_method_name("Normal_Add"), Some((RpcClass::Normal, "Add")));
    assert_eq!(RpcClass::from_method_name("Read_Get"), Some((RpcClass::ReadStream, "Get")));
    assert_eq!(RpcClass::from_method_name("Write_Put"), Some((RpcClass::WriteStream, "Put")));
    assert_eq!(RpcClass::from_method_name("Add"), None);
    assert_eq!(RpcClass::from_method_name("Normal_"), None);
}

#[test]
fn args_conversion() {
    let args = Args::new(vec![Value::Int(3), Value::Str("name".into()), Value::Nil]);
    assert_eq!(args.len(), 3);
    assert_eq!(args.get::<i64>(0), Ok(3));
    assert_eq!(args.get::<String>(1), Ok("name".to_string()));
    assert_eq!(args.get::<StrError>(2), Ok(StrError::nil()));
    assert!(args.get::<bool>(0).is_err());
    assert!(args.get::<i64>(5).is_err());

    let (n, name, err): (i64, String, StrError) = args.clone().parse().expect("three args");
    assert_eq!((n, name.as_str(), err.is_nil()), (3, "name", true));

    let short: Result<(i64, String), StrError> = args.parse();
    assert!(short.is_err());
}

#[test]
fn error_value_converts_to_err() {
    let args = Args::new(vec![Value::Error(StrError::new("denied"))]);
    assert_eq!(args.get::<i64>(0).map_err(|e| e.is_nil()), Err(false));
}

#[test]
fn str_error_into_result() {
    assert_eq!(StrError::nil().into_result(), Ok(()));

    let err = StrError::new("denied").into_result().expect_err("non-nil");
    assert_eq!(err.message(), Some("denied"));
    assert_eq!(err.to_string(), "denied");
    assert_eq!(StrError::nil().to_string(), "<nil>");
}
