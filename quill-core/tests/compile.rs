use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use quill_core::{
    CachePolicy, Compiler, CompilerConfig, ConstructKind, CoreError, NestingMode, RenderContext,
};
use tempfile::{TempDir, tempdir};

struct Site {
    dir: TempDir,
}

impl Site {
    fn new() -> Self {
        Site {
            dir: tempdir().expect("tempdir"),
        }
    }

    fn config(&self) -> CompilerConfig {
        CompilerConfig::new(self.dir.path().join("views"), self.cache_root())
    }

    fn cache_root(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    fn view(&self, name: &str, source: &str) -> PathBuf {
        let path = self.config().template_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, source).expect("write view");
        path
    }

    fn compile(&self, name: &str) -> Result<String, CoreError> {
        Compiler::new(self.config())
            .compile_view(name, &RenderContext::new())
            .map(|compiled| compiled.text)
    }

    fn artifacts(&self) -> usize {
        match fs::read_dir(self.cache_root()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).and_then(|m| m.modified()).expect("mtime")
}

#[test]
fn child_sections_fill_layout_yields() {
    let site = Site::new();
    site.view("base", "<h1>@yield('title')</h1>");
    site.view("child", "@extend('base')\n@section('title')Hi@stop");
    assert_eq!(site.compile("child").expect("compile"), "<h1>Hi</h1>");
}

#[test]
fn conditionals_compile_to_native_blocks() {
    let site = Site::new();
    site.view("page", "@if($a > 1) yes @endif");
    assert_eq!(
        site.compile("page").expect("compile"),
        "<?php if ($a > 1): ?> yes <?php endif; ?>"
    );
}

#[test]
fn upper_filter_wraps_the_variable() {
    let site = Site::new();
    site.view("page", "@{{ $name | upper }}");
    assert_eq!(
        site.compile("page").expect("compile"),
        "<?php echo strtoupper($name); ?>"
    );
}

#[test]
fn stray_terminator_is_unbalanced_and_leaves_no_artifact() {
    let site = Site::new();
    site.view("page", "@if(true) a @endif @endif");
    let err = site.compile("page").unwrap_err();
    assert!(matches!(
        err,
        CoreError::UnbalancedNesting {
            kind: ConstructKind::If,
            opened: 1,
            closed: 2
        }
    ));
    assert_eq!(site.artifacts(), 0);
}

#[test]
fn two_extends_are_rejected() {
    let site = Site::new();
    site.view("a", "");
    site.view("b", "");
    site.view("page", "@extend('a')\n@extend('b')");
    let err = site.compile("page").unwrap_err();
    assert!(matches!(err, CoreError::DuplicateExtend { count: 2, .. }));
}

#[test]
fn layouts_compile_standalone() {
    let site = Site::new();
    site.view("base", "<title>@yield('title')</title>");
    assert_eq!(site.compile("base").expect("compile"), "<title></title>");
}

#[test]
fn recompiling_unchanged_source_keeps_the_artifact() {
    let site = Site::new();
    let path = site.view("page", "<p>@{{ $x }}</p>");
    let compiler = Compiler::new(site.config());
    let context = RenderContext::new();
    let now = SystemTime::now();

    let first = compiler.compile_at(&path, &context, now).expect("first");
    assert!(first.written);
    let stamp = mtime(&first.cache_path);

    let second = compiler
        .compile_at(&path, &context, now + Duration::from_secs(10))
        .expect("second");
    assert!(!second.written);
    assert_eq!(second.cache_path, first.cache_path);
    assert_eq!(mtime(&second.cache_path), stamp);
}

#[test]
fn modifying_a_layout_rewrites() {
    let site = Site::new();
    site.view("base", "<main>@yield('content')</main>");
    let page = site.view("page", "@extend('base')@section('content')x@stop");
    let compiler = Compiler::new(site.config());

    let first = compiler.compile(&page).expect("first");
    site.view("base", "<article>@yield('content')</article>");
    let second = compiler.compile(&page).expect("second");

    assert!(second.written);
    assert_eq!(first.cache_path, second.cache_path);
    assert_eq!(
        fs::read_to_string(&second.cache_path).expect("artifact"),
        "<article>x</article>"
    );
}

#[test]
fn repeated_edits_keep_one_artifact_per_source() {
    let site = Site::new();
    let compiler = Compiler::new(site.config());
    let mut paths = Vec::new();
    for version in 0..5 {
        let page = site.view("page", &format!("v{version}"));
        let compiled = compiler.compile(&page).expect("compile");
        assert!(compiled.written);
        paths.push(compiled.cache_path);
    }
    paths.dedup();
    assert_eq!(paths.len(), 1);
    assert_eq!(site.artifacts(), 1);
    assert_eq!(fs::read_to_string(&paths[0]).expect("artifact"), "v4");
}

#[test]
fn freshness_policy_reuses_old_artifacts() {
    let site = Site::new();
    let path = site.view("page", "static");
    let config = site.config().with_cache_policy(CachePolicy::freshness());
    let compiler = Compiler::new(config);
    let context = RenderContext::new();

    let first = compiler.compile_at(&path, &context, SystemTime::now()).expect("first");
    assert!(first.written);

    let later = SystemTime::now() + Duration::from_secs(7200);
    let second = compiler.compile_at(&path, &context, later).expect("second");
    assert!(!second.written);
    assert_eq!(second.cache_path, first.cache_path);
}

#[test]
fn fresh_artifacts_are_returned_without_compiling() {
    let site = Site::new();
    site.view("base", "<main>@yield('content')</main>");
    let page = site.view("page", "@extend('base')@section('content')ok@stop");
    let compiler = Compiler::new(site.config().with_cache_policy(CachePolicy::freshness()));
    let context = RenderContext::new();

    let first = compiler.compile_at(&page, &context, SystemTime::now()).expect("first");
    assert_eq!(first.text, "<main>ok</main>");

    // Broken now, but both files and the artifact are past the window.
    site.view("page", "@extend('base')@section('content')@if(true) x @endif @endif@stop");
    let later = SystemTime::now() + Duration::from_secs(7200);
    let reused = compiler.compile_at(&page, &context, later).expect("reused");
    assert!(!reused.written);
    assert_eq!(reused.cache_path, first.cache_path);
    assert_eq!(reused.text, "<main>ok</main>");
    assert_eq!(reused.dependencies, first.dependencies);

    // Inside the window the edit is compiled and reported.
    let err = compiler.compile_at(&page, &context, SystemTime::now()).unwrap_err();
    assert!(matches!(err, CoreError::UnbalancedNesting { opened: 1, closed: 2, .. }));
}

#[test]
fn internal_components_ignore_layout_sections() {
    let site = Site::new();
    site.view("base", "@section('nav')<nav/>@stop<main>@yield('content')</main>");
    site.view("child", "@extend('base')\n@section('content')@component('nav')@stop");
    let err = site.compile("child").unwrap_err();
    assert!(matches!(err, CoreError::UndefinedSection { name, .. } if name == "nav"));

    site.view(
        "sibling",
        "@extend('base')\n@section('badge')<b/>@stop@section('content')@component('badge')@stop",
    );
    assert_eq!(site.compile("sibling").expect("compile"), "<main><b/></main>");
}

#[test]
fn components_resolve_in_the_right_scope() {
    let site = Site::new();
    site.view("partials/ui", "@section('button')<button/>@stop");
    site.view(
        "page",
        "@section('card')<div/>@stop@component('card')@component('partials/ui|button')",
    );
    assert_eq!(site.compile("page").expect("compile"), "<div/><button/>");

    site.view("other", "@section('card')<div/>@stop@component('partials/ui|card')");
    let err = site.compile("other").unwrap_err();
    assert!(matches!(err, CoreError::UndefinedSection { name, .. } if name == "card"));
}

#[test]
fn layout_cycles_are_reported() {
    let site = Site::new();
    site.view("a", "@extend('b')");
    site.view("b", "@extend('a')");
    assert!(matches!(site.compile("a").unwrap_err(), CoreError::LayoutCycle(_)));
}

#[test]
fn nested_blocks_of_the_same_kind() {
    let site = Site::new();
    site.view(
        "page",
        "@foreach($rows as $row)@if($row)@if($row > 1)big@else small@endif@endif@endforeach",
    );
    assert_eq!(
        site.compile("page").expect("compile"),
        "<?php foreach ($rows as $row): ?><?php if ($row): ?><?php if ($row > 1): ?>big<?php else: ?> small<?php endif; ?><?php endif; ?><?php endforeach; ?>"
    );
}

#[test]
fn counted_loops_and_branches() {
    let site = Site::new();
    site.view(
        "page",
        "@loop($i = 0; $i < 3; $i++)@if($a)A@elseif($b)B@endif@endloop",
    );
    assert_eq!(
        site.compile("page").expect("compile"),
        "<?php for ($i = 0; $i < 3; $i++): ?><?php if ($a): ?>A<?php elseif ($b): ?>B<?php endif; ?><?php endfor; ?>"
    );
}

#[test]
fn dumping_an_assignment_fails_without_artifact() {
    let site = Site::new();
    site.view("page", "@{{ $x = 1 | dump }}");
    assert!(matches!(
        site.compile("page").unwrap_err(),
        CoreError::InvalidDumpTarget(_)
    ));
    assert_eq!(site.artifacts(), 0);
}

#[test]
fn structural_mode_rejects_misordered_terminators() {
    let site = Site::new();
    site.view("page", "@endif @if($a) x");
    let lenient = site.compile("page");
    assert!(lenient.is_ok());

    let config = site.config().with_nesting(NestingMode::Structural);
    let err = Compiler::new(config)
        .compile_view("page", &RenderContext::new())
        .unwrap_err();
    assert!(matches!(err, CoreError::MisorderedNesting { .. }));
}
