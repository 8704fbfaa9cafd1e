use shadex_core::abi::HOST_NAME_CAPACITY;
use shadex_core::{
    register, unregister, ArgTypes, ArgValue, BufferToken, ExtError, ExtensionModule,
    FrameRequest, KindSet, ModuleConfig, ObjectKind, ObjectToken, PixelFormat, PrepareHints,
    ResultCode,
};

fn open() -> ExtensionModule {
    let mut name = [0u8; HOST_NAME_CAPACITY];
    let (_, module) = register(ModuleConfig::default(), &mut name).expect("register");
    module
}

fn create(module: &mut ExtensionModule, kind: ObjectKind) -> ObjectToken {
    let (token, expected) = module
        .begin_parse(kind, 0, b"example")
        .expect("begin parse");
    assert_eq!(expected, ArgTypes::NONE);
    module
        .finish_parse(token, true, kind, "obj")
        .expect("finish parse")
        .expect("object created")
}

fn create_sized(
    module: &mut ExtensionModule,
    kind: ObjectKind,
    width: i32,
    height: i32,
) -> ObjectToken {
    let (token, _) = module
        .begin_parse(kind, 1, b"example_sized")
        .expect("begin parse");
    module
        .apply_argument(token, 0, ArgValue::Int(width))
        .expect("width");
    module
        .apply_argument(token, 1, ArgValue::Int(height))
        .expect("height");
    module
        .finish_parse(token, true, kind, "sized")
        .expect("finish parse")
        .expect("object created")
}

#[test]
fn end_to_end_example_lifecycle() {
    let mut name = [0u8; HOST_NAME_CAPACITY];
    let (registration, mut module) =
        register(ModuleConfig::default(), &mut name).expect("register");
    assert_eq!(&name[..registration.name_len], b"example");
    assert_eq!(registration.version, 100);

    let mut keyword = [0u8; HOST_NAME_CAPACITY];
    let info = module
        .enumerate_initializer(0, &mut keyword)
        .expect("enumerate")
        .expect("initializer 0");
    assert_eq!(&keyword[..info.name_len], b"example");
    assert_eq!(info.kinds, KindSet::IMAGE | KindSet::ANIMATION);

    let object = create(&mut module, ObjectKind::Image);
    assert!(!module.is_animated(object).expect("animated attribute"));

    let prepared = module
        .prepare(object, PrepareHints::NONE)
        .expect("prepare");
    assert_eq!(prepared.working_set.width, 640);
    assert_eq!(prepared.working_set.height, 480);
    assert_eq!(prepared.working_set.format, PixelFormat::RgbaByte);

    let request = FrameRequest::for_working_set(prepared.working_set, 0.0);
    let buffer = module.fetch(object, &request).expect("fetch");
    assert_eq!(
        module.pixels(object, buffer).expect("pixels").len(),
        640 * 480 * 4
    );
    module.release(object, buffer).expect("release");
    module.destroy(object).expect("destroy");

    let stats = unregister(module);
    assert!(stats.is_balanced(), "{stats:?}");
    assert_eq!(stats.buffers_fetched, 1);
    assert_eq!(stats.objects_created, 1);
}

#[test]
fn repeated_cycles_keep_the_ledger_balanced() {
    let mut module = open();
    for cycle in 0..8 {
        let kind = if cycle % 2 == 0 {
            ObjectKind::Image
        } else {
            ObjectKind::Animation
        };
        let object = create_sized(&mut module, kind, 24, 16);
        let prepared = module
            .prepare(object, PrepareHints::HARD_RESET)
            .expect("prepare");
        for frame in 0..4 {
            let request = FrameRequest::for_working_set(prepared.working_set, frame as f32 * 0.1);
            let buffer = module.fetch(object, &request).expect("fetch");
            module.release(object, buffer).expect("release");
        }
        module.destroy(object).expect("destroy");
        assert!(module.stats().is_balanced(), "cycle {cycle}");
    }
    let stats = module.stats();
    assert_eq!(stats.objects_created, 8);
    assert_eq!(stats.buffers_fetched, 32);
    assert_eq!(stats.buffers_released, 32);
}

#[test]
fn invalid_fetch_requests_allocate_nothing() {
    let mut module = open();
    let object = create(&mut module, ObjectKind::Animation);
    let prepared = module
        .prepare(object, PrepareHints::NONE)
        .expect("prepare");
    let base = FrameRequest::for_working_set(prepared.working_set, 1.0);

    for request in [
        FrameRequest { width: 0, ..base },
        FrameRequest { height: 0, ..base },
        FrameRequest {
            format: PixelFormat::RgbaFloat,
            ..base
        },
    ] {
        let err = module.fetch(object, &request).expect_err("rejected");
        assert_eq!(err.code(), ResultCode::UnexpectedError);
    }
    let stats = module.stats();
    assert_eq!(stats.buffers_fetched, 0);
    assert_eq!(stats.bytes_outstanding, 0);
}

#[test]
fn animation_content_depends_on_time_and_images_stay_still() {
    let mut module = open();
    let animation = create_sized(&mut module, ObjectKind::Animation, 32, 32);
    let image = create_sized(&mut module, ObjectKind::Image, 32, 32);
    assert!(module.is_animated(animation).expect("attribute"));
    assert!(!module.is_animated(image).expect("attribute"));

    let frame_at = |module: &mut ExtensionModule, object: ObjectToken, time: f32| {
        let working_set = module.resize_query(object).expect("working set");
        let request = FrameRequest::for_working_set(working_set, time);
        let buffer = module.fetch(object, &request).expect("fetch");
        let pixels = module.pixels(object, buffer).expect("pixels").to_vec();
        module.release(object, buffer).expect("release");
        pixels
    };

    module.prepare(animation, PrepareHints::NONE).expect("prepare");
    module.prepare(image, PrepareHints::NONE).expect("prepare");

    assert_ne!(
        frame_at(&mut module, animation, 0.0),
        frame_at(&mut module, animation, 1.0)
    );
    for time in [0.0, 1.0] {
        let pixels = frame_at(&mut module, image, time);
        assert!(pixels.chunks_exact(4).all(|px| px[1] == 0 && px[2] == 0));
        assert!(!module.is_animated(image).expect("still after frames"));
    }
}

#[test]
fn buffer_tokens_are_single_use() {
    let mut module = open();
    let first = create(&mut module, ObjectKind::Image);
    let second = create(&mut module, ObjectKind::Image);
    let prepared = module.prepare(first, PrepareHints::NONE).expect("prepare");
    module.prepare(second, PrepareHints::NONE).expect("prepare");

    let request = FrameRequest::for_working_set(prepared.working_set, 0.0);
    let a = module.fetch(first, &request).expect("fetch a");
    let b = module.fetch(first, &request).expect("fetch b");

    assert!(
        module.release(second, a).is_err(),
        "buffer belongs to another object"
    );
    assert!(module.release(first, BufferToken::from_raw(0)).is_err());
    module.release(first, a).expect("release a");
    assert!(matches!(
        module.release(first, a),
        Err(ExtError::UnknownHandle { .. })
    ));
    module.release(first, b).expect("release b");

    let stats = module.stats();
    assert_eq!(stats.buffers_fetched, 2);
    assert_eq!(stats.buffers_released, 2);
}

#[test]
fn destroy_reclaims_outstanding_buffers_and_rejects_reuse() {
    let mut module = open();
    let object = create(&mut module, ObjectKind::Animation);
    let prepared = module.prepare(object, PrepareHints::NONE).expect("prepare");
    let request = FrameRequest::for_working_set(prepared.working_set, 0.0);
    let buffer = module.fetch(object, &request).expect("fetch");

    module.destroy(object).expect("destroy");
    assert!(module.stats().is_balanced());
    assert!(module.destroy(object).is_err(), "second destroy");
    assert!(module.release(object, buffer).is_err());
    assert!(module.prepare(object, PrepareHints::NONE).is_err());

    // A new object may reuse the slot but never the old token.
    let next = create(&mut module, ObjectKind::Image);
    assert_ne!(next, object);
    assert!(module.is_animated(object).is_err());
}

#[test]
fn parse_diagnostics_round_trip_through_both_encodings() {
    let mut module = open();
    let (token, expected) = module
        .begin_parse(ObjectKind::Image, 1, b"example_sized")
        .expect("begin");
    assert_eq!(expected, ArgTypes::INT);
    let err = module
        .apply_argument(token, 0, ArgValue::Float(2.5))
        .expect_err("float rejected");
    assert_eq!(err.code(), ResultCode::ParseError);

    let len = module
        .parse_error_len(token, shadex_core::Encoding::Utf8)
        .expect("diagnostic recorded");
    let mut short = vec![0xEEu8; len - 1];
    assert!(module
        .write_parse_error(token, shadex_core::Encoding::Utf8, &mut short)
        .is_err());
    assert!(short.iter().all(|byte| *byte == 0xEE));

    let mut exact = vec![0u8; len];
    let written = module
        .write_parse_error(token, shadex_core::Encoding::Utf8, &mut exact)
        .expect("write")
        .expect("message");
    assert_eq!(written, len);
    let message = String::from_utf8(exact).expect("utf8");
    assert!(message.contains("width"), "{message}");

    let units = module
        .parse_error_len(token, shadex_core::Encoding::Utf16)
        .expect("utf16 length");
    let mut wide = vec![0u8; units * 2];
    assert_eq!(
        module
            .write_parse_error(token, shadex_core::Encoding::Utf16, &mut wide)
            .expect("write")
            .expect("message"),
        units
    );

    assert_eq!(
        module
            .finish_parse(token, false, ObjectKind::Image, "bad")
            .expect("finish"),
        None
    );
    assert!(module.stats().is_balanced());
}

#[test]
fn begin_rejects_unknown_or_mismatched_initializers() {
    let mut module = open();
    assert!(matches!(
        module.begin_parse(ObjectKind::Image, 2, b"example"),
        Err(ExtError::UnknownInitializer { .. })
    ));
    assert!(module
        .begin_parse(ObjectKind::Image, 0, b"example_sized")
        .is_err());
    assert_eq!(module.stats().parse_contexts_opened, 0);
}

#[test]
fn configured_dimension_cap_bounds_sized_objects() {
    let config = ModuleConfig {
        max_dimension: 64,
        ..ModuleConfig::default()
    };
    let mut name = [0u8; HOST_NAME_CAPACITY];
    let (_, mut module) = register(config, &mut name).expect("register");
    let (token, _) = module
        .begin_parse(ObjectKind::Image, 1, b"example_sized")
        .expect("begin");
    module
        .apply_argument(token, 0, ArgValue::Int(64))
        .expect("at the cap");
    assert!(module.apply_argument(token, 1, ArgValue::Int(65)).is_err());
    module.discard_parse(token).expect("discard");
}

#[test]
fn tokens_never_cross_between_tables() {
    let mut module = open();
    let object = create(&mut module, ObjectKind::Animation);
    let (parse, _) = module
        .begin_parse(ObjectKind::Image, 0, b"example")
        .expect("begin parse");
    let prepared = module
        .prepare(object, PrepareHints::NONE)
        .expect("prepare");
    let request = FrameRequest::for_working_set(prepared.working_set, 0.0);
    let buffer = module.fetch(object, &request).expect("fetch");

    assert_ne!(parse.as_raw(), object.as_raw());
    assert_ne!(object.as_raw(), buffer.as_raw());
    assert_ne!(parse.as_raw(), buffer.as_raw());

    assert!(matches!(
        module.release(object, BufferToken::from_raw(object.as_raw())),
        Err(ExtError::UnknownHandle { .. })
    ));
    assert!(module
        .release(object, BufferToken::from_raw(parse.as_raw()))
        .is_err());
    assert!(module
        .is_animated(ObjectToken::from_raw(parse.as_raw()))
        .is_err());
    assert!(module
        .is_animated(ObjectToken::from_raw(buffer.as_raw()))
        .is_err());
    assert_eq!(module.stats().buffers_released, 0);

    module.release(object, buffer).expect("release");
    module.discard_parse(parse).expect("discard");
    module.destroy(object).expect("destroy");
    assert!(module.stats().is_balanced());
}
