use std::fs::File;
use std::path::Path;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::deletion_queue::GpuResource;

/// Vertex + fragment modules loaded from `<dir>/<name>.vert.spv` and `<dir>/<name>.frag.spv`
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
}

pub struct ComputeShader {
    pub comp_mod: vk::ShaderModule,
}

impl GraphicsShader {
    pub fn new(
        shader_dir: &Path,
        vert_name: &str,
        frag_name: &str,
        device: &ash::Device,
    ) -> Result<Self> {
        let vert_mod = create_shader_module(
            &shader_dir.join(format!("{}.vert.spv", vert_name)),
            device,
        )?;
        let frag_mod = match create_shader_module(
            &shader_dir.join(format!("{}.frag.spv", frag_name)),
            device,
        ) {
            Ok(module) => module,
            Err(err) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(err);
            }
        };
        Ok(Self { vert_mod, frag_mod })
    }

    /// Modules are only needed while pipelines are being built
    pub fn into_resources(self) -> [GpuResource; 2] {
        [
            GpuResource::ShaderModule(self.vert_mod),
            GpuResource::ShaderModule(self.frag_mod),
        ]
    }
}

impl ComputeShader {
    pub fn new(shader_dir: &Path, name: &str, device: &ash::Device) -> Result<Self> {
        let comp_mod = create_shader_module(
            &shader_dir.join(format!("{}.comp.spv", name)),
            device,
        )?;
        Ok(Self { comp_mod })
    }

    pub fn into_resource(self) -> GpuResource {
        GpuResource::ShaderModule(self.comp_mod)
    }
}

fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let mut file = File::open(filepath)
        .wrap_err_with(|| format!("Failed to open shader {:?}", filepath))?;
    // read_spv checks the length and realigns the words
    let code = ash::util::read_spv(&mut file)
        .wrap_err_with(|| format!("Invalid SPIR-V in {:?}", filepath))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };
    log::debug!("Loaded shader module {:?}", filepath);

    Ok(shader_module)
}
