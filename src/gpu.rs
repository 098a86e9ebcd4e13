use std::borrow::Cow;

use naga::FastHashMap;
use wgpu::util::DeviceExt;

use crate::errors::PoolgenError::Gpu;
use crate::errors::Result;
use crate::ops::GeneratedProgram;
use crate::printer::Dialect;
use crate::shader::{entry_point, render_module};

/// Runs generated programs on the default wgpu adapter.
pub struct GPUExecutor {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

fn create_storage_buf(device: &wgpu::Device, buf_label: &str, values: &[f32]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(format!("{}.storage", buf_label).as_str()),
        contents: bytemuck::cast_slice(values),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
    })
}

fn create_staging_buf(device: &wgpu::Device, buf_label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(format!("{}.staging", buf_label).as_str()),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn buffer_layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GPUExecutor {
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::create_device())
    }

    async fn create_device() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or_else(|| {
                log::warn!("no wgpu adapter available");
                Gpu("no adapter found".into())
            })?;
        log::debug!("using adapter {:?}", adapter.get_info());
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    features: wgpu::Features::empty(),
                    limits: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| Gpu(e.to_string()))?;
        Ok(Self { device, queue })
    }

    /// Binds `inputs` (one slice per entry of `variable_names`), an output
    /// buffer sized for `out_shape` and `uniforms`, dispatches the program and
    /// reads the output back.
    pub fn execute<U: bytemuck::Pod>(
        &self,
        program: &GeneratedProgram,
        inputs: &[&[f32]],
        uniforms: &U,
    ) -> Result<Vec<f32>> {
        pollster::block_on(self.execute_async(program, inputs, uniforms))
    }

    async fn execute_async<U: bytemuck::Pod>(
        &self,
        program: &GeneratedProgram,
        inputs: &[&[f32]],
        uniforms: &U,
    ) -> Result<Vec<f32>> {
        if inputs.len() != program.variable_names.len() {
            return Err(Gpu(format!(
                "program reads {:?} but {} inputs were given",
                program.variable_names,
                inputs.len()
            )));
        }
        let device = &self.device;

        let mut storage_bufs: Vec<wgpu::Buffer> = program
            .variable_names
            .iter()
            .zip(inputs)
            .map(|(name, values)| create_storage_buf(device, name, values))
            .collect();
        // zero-length bindings are invalid, keep at least one element
        let out_len = program.out_len().max(1);
        storage_bufs.push(create_storage_buf(device, "result", &vec![0.0; out_len]));
        let output_buf = &storage_bufs[storage_bufs.len() - 1];
        let staging_buf = create_staging_buf(device, "result", output_buf.size());
        let uniform_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniforms"),
            contents: bytemuck::bytes_of(uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        self.execute_pass(program, &storage_bufs, &uniform_buf, &mut encoder)?;
        encoder.copy_buffer_to_buffer(output_buf, 0, &staging_buf, 0, staging_buf.size());
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buf.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });
        device.poll(wgpu::Maintain::Wait);

        match receiver.receive().await {
            Some(Ok(())) => {
                let data = buffer_slice.get_mapped_range();
                let values: Vec<f32> = bytemuck::cast_slice(&data)[..program.out_len()].to_vec();
                drop(data);
                staging_buf.unmap();
                Ok(values)
            }
            Some(Err(e)) => Err(Gpu(e.to_string())),
            None => Err(Gpu("staging buffer was never mapped".into())),
        }
    }

    fn execute_pass(
        &self,
        program: &GeneratedProgram,
        storage_bufs: &[wgpu::Buffer],
        uniform_buf: &wgpu::Buffer,
        command_encoder: &mut wgpu::CommandEncoder,
    ) -> Result<()> {
        let device = &self.device;
        let source = render_module(program)?;
        let shader_source = match program.dialect {
            Dialect::Wgsl => wgpu::ShaderSource::Wgsl(Cow::Borrowed(&source)),
            Dialect::Glsl => wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(&source),
                stage: naga::ShaderStage::Compute,
                defines: FastHashMap::default(),
            },
        };
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pool"),
            source: shader_source,
        });

        let n_inputs = storage_bufs.len() - 1;
        let mut bindgroup_layout_entries: Vec<wgpu::BindGroupLayoutEntry> = vec![];
        for binding in 0..storage_bufs.len() {
            let read_only = binding < n_inputs;
            bindgroup_layout_entries.push(buffer_layout_entry(
                binding as u32,
                wgpu::BufferBindingType::Storage { read_only },
            ));
        }
        bindgroup_layout_entries.push(buffer_layout_entry(
            storage_bufs.len() as u32,
            wgpu::BufferBindingType::Uniform,
        ));
        let bindgroup_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bindgroup_layout_pool"),
            entries: bindgroup_layout_entries.as_slice(),
        });

        let mut bindgroup_entries: Vec<wgpu::BindGroupEntry> = storage_bufs
            .iter()
            .enumerate()
            .map(|(binding, buf)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buf.as_entire_binding(),
            })
            .collect();
        bindgroup_entries.push(wgpu::BindGroupEntry {
            binding: storage_bufs.len() as u32,
            resource: uniform_buf.as_entire_binding(),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pipeline_layout_pool"),
            bind_group_layouts: &[&bindgroup_layout],
            push_constant_ranges: &[],
        });
        let compute_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("compute_pipeline_pool"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: entry_point(program.dialect),
        });

        let bindgroup = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bindgroup_pool"),
            layout: &bindgroup_layout,
            entries: bindgroup_entries.as_slice(),
        });

        {
            let mut cpass =
                command_encoder.begin_compute_pass(&wgpu::ComputePassDescriptor { label: None });
            cpass.set_pipeline(&compute_pipeline);
            cpass.set_bind_group(0, &bindgroup, &[]);
            let [x, y, z] = program.dispatch;
            cpass.dispatch_workgroups(x, y, z);
        }
        Ok(())
    }
}
