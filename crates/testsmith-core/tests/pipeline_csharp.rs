use std::sync::Arc;

use testsmith_core::{
    CaseStatus, CsharpAdapter, CsharpConfig, LanguageAdapter, PipelineExecutor, RunStatus,
};
use testsmith_test_utils::{ScriptedEngine, fenced, work_dir};

const CALC: &str = "namespace Shop;\n\npublic class Calc\n{\n    public int Add(int a, int b) => a + b;\n}";

const CALC_TESTS: &str = "public class CalcTests\n{\n    [Fact]\n    public void Add_ReturnsSum() => Assert.Equal(5, new Calc().Add(2, 3));\n}";

fn executor(config: CsharpConfig, dir: &std::path::Path) -> PipelineExecutor {
    let engine = ScriptedEngine::always(fenced("csharp", CALC_TESTS));
    let adapter: Arc<dyn LanguageAdapter> = Arc::new(CsharpAdapter::new(Arc::new(engine), config));
    PipelineExecutor::new(adapter, dir)
}

/// `sh restore` in a tests dir without a `restore` script exits non-zero,
/// which exercises the failed-restore path without a .NET SDK.
fn failing_restore() -> CsharpConfig {
    CsharpConfig {
        program: "sh".into(),
        ..CsharpConfig::default()
    }
}

#[tokio::test]
async fn single_snippet_scaffolds_projects_and_sources() {
    let tmp = work_dir();
    let result = executor(failing_restore(), tmp.path())
        .execute(CALC)
        .await
        .unwrap();

    let root = &result.project.root;
    let name = root.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("cs_project_"), "unexpected project name {name}");
    assert!(root.join("src/App.csproj").is_file());
    assert!(root.join("tests/Tests.csproj").is_file());

    let program = std::fs::read_to_string(root.join("src/Program.cs")).unwrap();
    assert!(program.starts_with("using System;\n"));
    assert!(program.contains("public class Calc"));

    let tests = std::fs::read_to_string(root.join("tests/UnitTests.cs")).unwrap();
    assert!(tests.contains("using Xunit;"));
    assert!(tests.contains("using Shop;"));
    assert!(tests.contains("public class CalcTests"));
}

#[tokio::test]
async fn failed_restore_is_a_failed_case() {
    let tmp = work_dir();
    let result = executor(failing_restore(), tmp.path())
        .execute(CALC)
        .await
        .unwrap();

    assert!(!result.is_infrastructure_failure());
    assert_eq!(result.report.status, RunStatus::Failed);
    assert_eq!(result.report.cases.len(), 1);
    assert_eq!(result.report.cases[0].name, "dotnet restore");
    assert_eq!(result.report.cases[0].status, CaseStatus::Failed);
}

#[tokio::test]
async fn batch_uses_indexed_names() {
    let tmp = work_dir();
    let snippets = vec![CALC.to_string(), "public class Other { }".to_string()];
    let result = executor(failing_restore(), tmp.path())
        .execute(snippets)
        .await
        .unwrap();

    let root = &result.project.root;
    assert!(root.join("src/Module_1.cs").is_file());
    assert!(root.join("src/Module_2.cs").is_file());
    assert!(root.join("tests/Module_1Tests.cs").is_file());
    assert!(root.join("tests/Module_2Tests.cs").is_file());
    assert!(!root.join("src/Program.cs").exists());
}

#[tokio::test]
async fn missing_sdk_is_infrastructure_failure() {
    let tmp = work_dir();
    let config = CsharpConfig {
        program: "testsmith-missing-dotnet".into(),
        ..CsharpConfig::default()
    };
    let result = executor(config, tmp.path()).execute(CALC).await.unwrap();

    assert!(result.is_infrastructure_failure());
    assert_eq!(result.report.status, RunStatus::Error);
    assert!(result.report.cases.is_empty());
}
