use vfs::{FsError, PathComponent, dir_prefix, file_name, normalize_path, parse_path};

#[test]
fn test_parse_path_components() {
    assert_eq!(
        parse_path("/web/./../a"),
        vec![
            PathComponent::Root,
            PathComponent::Normal("web".to_string()),
            PathComponent::Current,
            PathComponent::Parent,
            PathComponent::Normal("a".to_string()),
        ]
    );
    assert!(parse_path("").is_empty());
}

#[test]
fn test_normalize_path_leading_slash_optional() {
    assert_eq!(normalize_path("/index.html"), "index.html");
    assert_eq!(normalize_path("index.html"), "index.html");
    assert_eq!(normalize_path("///web///app.js///"), "web/app.js");
}

#[test]
fn test_normalize_path_current() {
    assert_eq!(normalize_path("/web/./app.js"), "web/app.js");
    assert_eq!(normalize_path("./config.json"), "config.json");
    assert_eq!(normalize_path("."), "");
}

#[test]
fn test_normalize_path_parent_stays_inside_root() {
    assert_eq!(normalize_path("/web/img/.."), "web");
    assert_eq!(normalize_path("web/../config.json"), "config.json");
    assert_eq!(normalize_path("/.."), "");
    assert_eq!(normalize_path("../../etc"), "etc");
}

#[test]
fn test_normalize_path_complex() {
    assert_eq!(normalize_path("/foo/./bar/../baz/./qux/.."), "foo/baz");
}

#[test]
fn test_file_name_rejects_directories() {
    assert_eq!(file_name("/config.json"), Ok("config.json".to_string()));
    assert_eq!(file_name("/web/"), Err(FsError::InvalidArgument));
    assert_eq!(file_name("/"), Err(FsError::InvalidArgument));
    assert_eq!(file_name(""), Err(FsError::InvalidArgument));
    assert_eq!(file_name("web/.."), Err(FsError::InvalidArgument));
}

#[test]
fn test_dir_prefix_root_forms() {
    assert_eq!(dir_prefix(""), "");
    assert_eq!(dir_prefix("/"), "");
    assert_eq!(dir_prefix("."), "");
    assert_eq!(dir_prefix("/web/img"), "web/img/");
}
