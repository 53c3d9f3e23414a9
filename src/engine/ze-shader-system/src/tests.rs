use crate::binder::UniformBinder;
use crate::program::{ProgramSource, ProgramState};
use crate::test_utils::ScriptedCompiler;
use crate::{Error, ShaderManager};
use std::sync::Arc;
use ze_filesystem::mount_points::MemoryMountPoint;
use ze_filesystem::path::Path;
use ze_filesystem::FileSystem;
use ze_gfx::backend::{ActiveUniform, UniformLocation};
use ze_gfx::null::{NullDevice, RecordedUniformValue};
use ze_gfx::{GpuParamVariabilityFlagBits, GpuProgramType};
use ze_shader_compiler::{CompiledProgramData, CompilerParameter, CompilerType};

const DIFFUSE_SOURCE: &str = "#include \"common.cg\"\nvoid main_vp(float4 pos : POSITION) {}\n";

fn filesystem() -> Arc<FileSystem> {
    let filesystem = FileSystem::new();

    let shaders = MemoryMountPoint::new("shaders");
    shaders.insert("diffuse.cg", DIFFUSE_SOURCE);
    shaders.insert("common.cg", "uniform float4x4 worldViewProj;");
    shaders.insert("flat.cg", "void main() {}");
    filesystem.mount(shaders);

    filesystem.mount(MemoryMountPoint::new("cache"));
    filesystem
}

fn diffuse_program() -> CompiledProgramData {
    CompiledProgramData {
        program_string: b"!!ARBvp1.0\nEND".to_vec(),
        program_parameters: vec![
            CompilerParameter::uniform(
                "worldViewProj",
                CompilerType::FloatMatrix {
                    rows: 4,
                    columns: 4,
                },
            ),
            CompilerParameter::uniform("ambient", CompilerType::Float4).with_resource_index(4),
            CompilerParameter::array(
                "lights",
                2,
                CompilerParameter::uniform("lights[0]", CompilerType::Float4)
                    .with_resource_index(5),
            ),
        ],
        global_parameters: vec![CompilerParameter::uniform("passNumber", CompilerType::Float)
            .with_resource_index(7)],
    }
}

fn manager(
    device: &Arc<NullDevice>,
    compiler: &Arc<ScriptedCompiler>,
    filesystem: &Arc<FileSystem>,
) -> Arc<ShaderManager> {
    ShaderManager::new(device.clone(), compiler.clone(), filesystem.clone())
}

fn create_diffuse(manager: &ShaderManager) {
    let program = manager
        .create_program(
            "Diffuse_VP",
            "shaders",
            GpuProgramType::Vertex,
            ProgramSource::File("diffuse.cg".to_string()),
        )
        .unwrap();
    let mut program = program.lock();
    program.set_parameter("profiles", "vs_1_1 arbvp1");
    program.set_parameter("entry_point", "main_vp");
}

#[test]
fn compile_then_cache_hit() {
    let device = NullDevice::new(&["arbvp1"], true);
    let compiler = Arc::new(ScriptedCompiler::new().succeed("Diffuse_VP", diffuse_program()));
    let filesystem = filesystem();
    let manager = manager(&device, &compiler, &filesystem);
    manager.microcode_cache().set_save_to_cache(true);

    create_diffuse(&manager);
    manager.load_program("Diffuse_VP").unwrap();

    let invocations = compiler.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].profile, "arbvp1");
    assert_eq!(invocations[0].entry_point, "main_vp");
    assert!(invocations[0].arguments.is_empty());
    assert!(invocations[0]
        .code
        .starts_with("#line 1 \"common.cg\"\nuniform float4x4 worldViewProj;\n#line 1 \"diffuse.cg\"\n"));
    assert_eq!(compiler.live_handles(), 0);
    assert!(manager.microcode_cache().is_available("CG_Diffuse_VP"));

    let constants = manager.named_constants("Diffuse_VP").unwrap();
    assert_eq!(constants.get("worldViewProj").unwrap().physical_index, 0);
    assert_eq!(constants.get("ambient").unwrap().physical_index, 16);
    assert_eq!(constants.get("lights").unwrap().array_size, 2);
    assert_eq!(constants.get("lights[1]").unwrap().physical_index, 24);
    assert_eq!(constants.get("passNumber").unwrap().physical_index, 28);
    assert_eq!(constants.float_buffer_size, 32);

    manager.reload_program("Diffuse_VP").unwrap();
    assert_eq!(compiler.invocations().len(), 1);
    assert_eq!(*manager.named_constants("Diffuse_VP").unwrap(), *constants);
}

#[test]
fn vs_1_1_compiles_with_dcls() {
    let device = NullDevice::new(&["vs_1_1"], true);
    let compiler = Arc::new(ScriptedCompiler::new().succeed("Diffuse_VP", diffuse_program()));
    let manager = manager(&device, &compiler, &filesystem());

    create_diffuse(&manager);
    manager
        .program("Diffuse_VP")
        .unwrap()
        .lock()
        .set_parameter("compile_arguments", "-DSKINNED");
    manager.load_program("Diffuse_VP").unwrap();

    assert_eq!(
        compiler.invocations()[0].arguments,
        vec!["-DSKINNED", "-profileopts", "dcls"]
    );
}

#[test]
fn unsupported_profiles_never_compile() {
    let device = NullDevice::new(&["glslv"], true);
    let compiler = Arc::new(ScriptedCompiler::new().succeed("Diffuse_VP", diffuse_program()));
    let manager = manager(&device, &compiler, &filesystem());

    create_diffuse(&manager);
    assert!(matches!(
        manager.load_program("Diffuse_VP"),
        Err(Error::ProfileUnsupported { program, profiles })
            if program == "Diffuse_VP" && profiles == vec!["vs_1_1", "arbvp1"]
    ));
    assert!(compiler.invocations().is_empty());
    assert!(!manager.is_supported("Diffuse_VP"));
    assert!(matches!(
        manager.named_constants("Diffuse_VP"),
        Err(Error::NotLoaded(_))
    ));
    assert_eq!(
        manager.program("Diffuse_VP").unwrap().lock().state(),
        ProgramState::Failed
    );
}

#[test]
fn compile_errors_are_kept() {
    let device = NullDevice::new(&[], true);
    let compiler = Arc::new(
        ScriptedCompiler::new().fail("Diffuse_VP", &["diffuse.cg(2) : error C0000: syntax error"]),
    );
    let manager = manager(&device, &compiler, &filesystem());

    create_diffuse(&manager);
    assert!(manager.is_supported("Diffuse_VP"));
    assert!(matches!(
        manager.load_program("Diffuse_VP"),
        Err(Error::CompileError { .. })
    ));
    assert!(!manager.is_supported("Diffuse_VP"));

    let program = manager.program("Diffuse_VP").unwrap();
    let program = program.lock();
    assert_eq!(
        program.diagnostics(),
        &["diffuse.cg(2) : error C0000: syntax error".to_string()]
    );
    assert!(program.parameters().is_empty());
    assert!(program.program_object().is_none());
}

#[test]
fn duplicate_and_unknown_programs() {
    let device = NullDevice::new(&[], true);
    let compiler = Arc::new(ScriptedCompiler::new());
    let manager = manager(&device, &compiler, &filesystem());

    create_diffuse(&manager);
    assert!(matches!(
        manager.create_program(
            "Diffuse_VP",
            "shaders",
            GpuProgramType::Vertex,
            ProgramSource::File("diffuse.cg".to_string())
        ),
        Err(Error::DuplicateProgram(_))
    ));
    assert!(matches!(
        manager.load_program("Missing"),
        Err(Error::UnknownProgram(name)) if name == "Missing"
    ));

    assert!(manager.remove_program("Diffuse_VP"));
    assert!(manager.program_names().is_empty());
}

#[test]
fn config_declares_programs() {
    let device = NullDevice::new(&["arbvp1", "arbfp1"], true);
    let compiler = Arc::new(
        ScriptedCompiler::new()
            .succeed("Diffuse_VP", diffuse_program())
            .succeed("Flat_FP", CompiledProgramData::default()),
    );
    let filesystem = filesystem();
    let config = MemoryMountPoint::new("config");
    config.insert(
        "shaders.yaml",
        r#"
microcode_cache:
  save_to_cache: true
  path: /cache/microcode.bin
programs:
  - name: Diffuse_VP
    type: vertex
    group: shaders
    source: diffuse.cg
    entry_point: main_vp
    profiles: "vs_1_1 arbvp1"
  - name: Flat_FP
    type: fragment
    group: shaders
    source: flat.cg
    profiles: arbfp1
"#,
    );
    filesystem.mount(config);

    let manager = manager(&device, &compiler, &filesystem);
    let config = manager
        .load_config(&Path::parse("/config/shaders.yaml").unwrap())
        .unwrap();
    assert_eq!(config.programs.len(), 2);
    assert!(manager.microcode_cache().save_to_cache());
    assert_eq!(manager.program_names(), vec!["Diffuse_VP", "Flat_FP"]);

    assert!(manager.load_all().is_empty());
    assert_eq!(compiler.invocations().len(), 2);
    assert_eq!(manager.microcode_cache().len(), 2);

    assert!(manager.load_all().is_empty());
    assert_eq!(compiler.invocations().len(), 2);
}

#[test]
fn load_all_reports_failures() {
    let device = NullDevice::new(&[], true);
    let compiler = Arc::new(
        ScriptedCompiler::new()
            .succeed("Diffuse_VP", diffuse_program())
            .fail("Broken_FP", &["error"]),
    );
    let manager = manager(&device, &compiler, &filesystem());

    create_diffuse(&manager);
    manager
        .create_program(
            "Broken_FP",
            "shaders",
            GpuProgramType::Fragment,
            ProgramSource::Inline {
                origin: "broken.cg".to_string(),
                text: "void main( {}".to_string(),
            },
        )
        .unwrap()
        .lock()
        .set_parameter("profiles", "arbfp1");

    let failures = manager.load_all();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "Broken_FP");
    assert!(matches!(failures[0].1, Error::CompileError { .. }));
    assert!(manager.program("Diffuse_VP").unwrap().lock().is_ready());

    let invocations = compiler.invocations();
    assert_eq!(invocations.len(), 2);
    for invocation in invocations {
        let thread = invocation.thread.unwrap_or_default();
        assert!(thread.starts_with("Shader Compiler "), "compiled on {}", thread);
    }
}

#[test]
fn microcode_survives_sessions() {
    let device = NullDevice::new(&[], true);
    let filesystem = filesystem();
    let cache_path = Path::parse("/cache/microcode.bin").unwrap();

    {
        let compiler =
            Arc::new(ScriptedCompiler::new().succeed("Diffuse_VP", diffuse_program()));
        let manager = manager(&device, &compiler, &filesystem);
        manager.microcode_cache().set_save_to_cache(true);
        create_diffuse(&manager);
        manager.load_program("Diffuse_VP").unwrap();
        manager.save_microcode_cache(&cache_path).unwrap();
        assert!(!manager.microcode_cache().is_dirty());
    }

    let compiler = Arc::new(ScriptedCompiler::new());
    let manager = manager(&device, &compiler, &filesystem);
    assert_eq!(manager.load_microcode_cache(&cache_path).unwrap(), 1);
    create_diffuse(&manager);
    manager.load_program("Diffuse_VP").unwrap();

    assert!(compiler.invocations().is_empty());
    let program = manager.program("Diffuse_VP").unwrap();
    let program = program.lock();
    assert_eq!(program.program_string(), b"!!ARBvp1.0\nEND");
    assert_eq!(program.parameters().len(), 4);
    assert_eq!(program.logical_maps().float.buffer_size(), 32);
}

#[test]
fn bind_loaded_program() {
    let device = NullDevice::new(&[], true);
    let compiler = Arc::new(ScriptedCompiler::new().succeed("Diffuse_VP", diffuse_program()));
    let manager = manager(&device, &compiler, &filesystem());
    create_diffuse(&manager);
    manager.load_program("Diffuse_VP").unwrap();

    let program_object = manager
        .program("Diffuse_VP")
        .unwrap()
        .lock()
        .program_object()
        .cloned()
        .unwrap();
    device.declare_uniforms(
        &program_object,
        vec![
            ActiveUniform {
                name: "worldViewProj".to_string(),
                location: UniformLocation(0),
                array_size: 1,
            },
            ActiveUniform {
                name: "lights[0]".to_string(),
                location: UniformLocation(1),
                array_size: 2,
            },
            ActiveUniform {
                name: "passNumber".to_string(),
                location: UniformLocation(2),
                array_size: 1,
            },
        ],
    );

    let mut binder = UniformBinder::new();
    manager.attach_program(&mut binder, "Diffuse_VP").unwrap();

    let mut parameters = manager.create_parameters("Diffuse_VP").unwrap();
    let lights: Vec<f32> = (0..8).map(|i| i as f32).collect();
    parameters.set_named_f32("lights", &lights).unwrap();
    parameters
        .set_variability("lights", GpuParamVariabilityFlagBits::Lights.into())
        .unwrap();
    parameters.set_pass_iteration_constant("passNumber").unwrap();

    binder.update_uniforms(
        device.as_ref(),
        &parameters,
        GpuParamVariabilityFlagBits::Lights.into(),
        GpuProgramType::Vertex,
    );
    let uploads = device.take_uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        uploads[0].value,
        RecordedUniformValue::Float {
            components: 4,
            count: 2,
            data: lights,
        }
    );

    binder.update_uniforms(
        device.as_ref(),
        &parameters,
        GpuParamVariabilityFlagBits::Lights.into(),
        GpuProgramType::Fragment,
    );
    assert!(device.take_uploads().is_empty());

    parameters.increment_pass_iteration_number();
    assert!(binder.update_pass_iteration_uniforms(device.as_ref(), &parameters));
    let uploads = device.take_uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].location, UniformLocation(2));
}
