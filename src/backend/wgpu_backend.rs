//! wgpu device backend
//!
//! One render pipeline, no vertex buffers: the vertex stage synthesizes a
//! fullscreen triangle and the fragment stage reads the cell storage buffer
//! and the atlas texture.

use std::sync::Arc;

use pollster::block_on;
use winit::window::Window;

use super::{
    BYTES_PER_PIXEL, Cell, ConstBuffer, CopyHint, RenderBackend, ResourceState, TileData,
    check_tile_bounds,
};
use crate::error::{EngineError, Result};
use crate::geometry::{Size, TileCoord};

const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Atlas texture plus the view the fragment shader samples
pub struct WgpuAtlas {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Size,
}

impl WgpuAtlas {
    pub fn size(&self) -> Size {
        self.size
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    constant_buffer: wgpu::Buffer,
    cell_buffer: wgpu::Buffer,
    cell_capacity: usize,
    // Dropped whenever the atlas or the cell buffer is replaced
    bind_group: Option<wgpu::BindGroup>,
    frame: Option<wgpu::SurfaceTexture>,
    back_buffer_state: ResourceState,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| EngineError::ResourceCreation {
                what: "surface",
                reason: e.to_string(),
            })?;
        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| EngineError::ResourceCreation {
            what: "adapter",
            reason: e.to_string(),
        })?;

        let (device, queue) = block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("cellatlas"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| EngineError::ResourceCreation {
            what: "device",
            reason: e.to_string(),
        })?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            // Sync interval 1
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Grid Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/grid.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Grid Bind Group Layout"),
            entries: &[
                // Constants
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Cells
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Atlas
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Grid Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Grid Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let constant_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Grid Constants"),
            size: std::mem::size_of::<ConstBuffer>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let cell_capacity = 4096;
        let cell_buffer = Self::create_cell_buffer(&device, cell_capacity);

        Ok(Self {
            device,
            queue,
            surface,
            config,
            pipeline,
            bind_group_layout,
            constant_buffer,
            cell_buffer,
            cell_capacity,
            bind_group: None,
            frame: None,
            back_buffer_state: ResourceState::Present,
        })
    }

    fn create_cell_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Grid Cells"),
            size: (capacity * std::mem::size_of::<Cell>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn ensure_bind_group(&mut self, atlas: &WgpuAtlas) {
        if self.bind_group.is_some() {
            return;
        }
        self.bind_group = Some({
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Grid Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.constant_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.cell_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&atlas.view),
                    },
                ],
            })
        });
    }
}

impl RenderBackend for WgpuBackend {
    type Texture = WgpuAtlas;

    fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_atlas(&mut self, size: Size) -> Result<WgpuAtlas> {
        if size.width > self.max_texture_dimension() || size.height > self.max_texture_dimension()
        {
            return Err(EngineError::ResourceCreation {
                what: "atlas texture",
                reason: format!("{}x{} exceeds device limit", size.width, size.height),
            });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Glyph Atlas"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ATLAS_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.bind_group = None;
        Ok(WgpuAtlas {
            texture,
            view,
            size,
        })
    }

    fn copy_atlas_region(
        &mut self,
        src: &WgpuAtlas,
        dst: &mut WgpuAtlas,
        region: Size,
    ) -> Result<()> {
        if !check_tile_bounds(src.size, TileCoord::default(), region)
            || !check_tile_bounds(dst.size, TileCoord::default(), region)
        {
            return Err(EngineError::Gpu("atlas copy region out of bounds".into()));
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Atlas Copy"),
            });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn upload_tile(
        &mut self,
        atlas: &mut WgpuAtlas,
        target: TileCoord,
        tile: &TileData<'_>,
        hint: CopyHint,
    ) -> Result<()> {
        if !check_tile_bounds(atlas.size, target, tile.size) {
            return Err(EngineError::Gpu(format!(
                "tile at {},{} outside {}x{} atlas",
                target.x, target.y, atlas.size.width, atlas.size.height
            )));
        }
        // Queue writes are staged and ordered before later submissions, so
        // both hints take the same path here.
        log::trace!("upload tile {},{} ({hint:?})", target.x, target.y);
        let needed =
            ((tile.size.height - 1) * tile.stride + tile.size.width * BYTES_PER_PIXEL) as usize;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &atlas.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: target.x as u32,
                    y: target.y as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &tile.pixels[..needed],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(tile.stride),
                rows_per_image: Some(tile.size.height),
            },
            wgpu::Extent3d {
                width: tile.size.width,
                height: tile.size.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn write_constants(&mut self, constants: &ConstBuffer) -> Result<()> {
        self.queue
            .write_buffer(&self.constant_buffer, 0, bytemuck::bytes_of(constants));
        Ok(())
    }

    fn write_cells(&mut self, cells: &[Cell]) -> Result<()> {
        if cells.len() > self.cell_capacity {
            self.cell_capacity = (cells.len() * 2).next_power_of_two();
            self.cell_buffer = Self::create_cell_buffer(&self.device, self.cell_capacity);
            self.bind_group = None;
        }
        self.queue
            .write_buffer(&self.cell_buffer, 0, bytemuck::cast_slice(cells));
        Ok(())
    }

    fn wait_for_frame_latency(&mut self) -> Result<()> {
        // With a maximum frame latency of one, acquiring the next surface
        // texture blocks until the previous frame has been consumed.
        if self.frame.is_none() {
            self.frame = Some(self.surface.get_current_texture()?);
        }
        Ok(())
    }

    fn transition_back_buffer(
        &mut self,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<()> {
        // wgpu tracks resource usage itself; only the ordering is checked.
        if self.back_buffer_state != before {
            return Err(EngineError::Gpu(format!(
                "back buffer is {:?}, expected {before:?}",
                self.back_buffer_state
            )));
        }
        self.back_buffer_state = after;
        Ok(())
    }

    fn draw_fullscreen_triangle(&mut self, atlas: &WgpuAtlas, viewport: Size) -> Result<()> {
        let view = match &self.frame {
            Some(frame) => frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
            None => return Err(EngineError::Gpu("no back buffer acquired".into())),
        };
        let width = viewport.width.min(self.config.width).max(1) as f32;
        let height = viewport.height.min(self.config.height).max(1) as f32;

        self.ensure_bind_group(atlas);
        let Some(bind_group) = &self.bind_group else {
            return Err(EngineError::Gpu("bind group missing".into()));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Grid Frame"),
            });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Grid"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            rp.set_viewport(0.0, 0.0, width, height, 0.0, 1.0);
            rp.set_pipeline(&self.pipeline);
            rp.set_bind_group(0, bind_group, &[]);
            rp.draw(0..3, 0..1); // Fullscreen triangle
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| EngineError::Gpu("present without an acquired frame".into()))?;
        frame.present();
        Ok(())
    }

    fn resize_surface(&mut self, size: Size) -> Result<()> {
        self.frame = None;
        self.back_buffer_state = ResourceState::Present;
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(&self.device, &self.config);
        Ok(())
    }
}
