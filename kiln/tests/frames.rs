mod common;

use ash::vk;
use common::{barrier_commands, graph, submission_of, Pass};
use kiln::prelude::*;
use kiln_vk::device::TestDevice;
use kiln_vk::VkError;

#[test]
fn acquire_render_present() {
    let device = TestDevice::new();
    let queue = device.queue(0, vk::QueueFlags::GRAPHICS);
    let swapchain: vk::SwapchainKHR = device.fresh_handle();
    let image: vk::Image = device.fresh_handle();
    let mut graph = graph(&device, 2);

    let acquire = graph
        .add_node(queue, |builder| {
            AcquireNode::new(builder, swapchain, vec![image], None)
        })
        .unwrap();
    let acquired = graph.node(acquire).unwrap().acquired();
    let render = graph
        .add_node(queue, |builder| {
            Pass::with_image(
                builder,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            )
        })
        .unwrap();
    graph.node_mut(render).unwrap().sync_image(image);
    let present = graph
        .add_node(queue, |builder| {
            PresentNode::new(
                builder,
                acquired,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            )
        })
        .unwrap();

    let render_usage = graph.node(render).unwrap().image_usages[0];
    graph
        .add_edge(ImageEdge::new(
            graph.node(acquire).unwrap().image_usage(),
            render_usage,
        ))
        .unwrap();
    graph
        .add_edge(ImageEdge::new(
            render_usage,
            graph.node(present).unwrap().image_usage(),
        ))
        .unwrap();
    graph.bake().unwrap();
    assert_eq!(
        graph.execution_order(),
        &[acquire.id(), render.id(), present.id()]
    );

    for _ in 0..3 {
        graph.execute().unwrap();
    }
    assert_eq!(graph.frame_count(), 5);
    assert_eq!(graph.current_frame(), 1);

    let waits = device.waits();
    assert_eq!(waits.len(), 3);
    for (wait, target) in waits.iter().zip([0, 1, 2]) {
        assert_eq!(wait.len(), 3);
        assert!(wait.iter().all(|(_, value)| *value == target));
    }

    let presents = device.presents();
    assert_eq!(presents.len(), 3);
    assert!(presents
        .iter()
        .all(|present| present.swapchain == swapchain && present.image_index == 0));

    let pass = graph.node(render).unwrap();
    assert_eq!(pass.frames, vec![(0, 2), (1, 3), (0, 4)]);
    assert_eq!(pass.rendered, 3);
    assert_eq!(pass.post_rendered, 3);

    // acquire hands the image to the render pass, which hands it to the present
    let acquire_cmd = graph.node_command_buffer(acquire.id(), 0).unwrap();
    let barriers = barrier_commands(&submission_of(&device, acquire_cmd));
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].1.len(), 1);
    assert_eq!(barriers[0].1[0].old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(
        barriers[0].1[0].new_layout,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    );

    let render_cmd = graph.node_command_buffer(render.id(), 0).unwrap();
    let barriers = barrier_commands(&submission_of(&device, render_cmd));
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].1[0].image, image);
    assert_eq!(
        barriers[0].1[0].old_layout,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    );
    assert_eq!(barriers[0].1[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
}

#[test]
fn submission_values() {
    let device = TestDevice::new();
    let queue = device.queue(0, vk::QueueFlags::GRAPHICS);
    let swapchain: vk::SwapchainKHR = device.fresh_handle();
    let mut graph = graph(&device, 2);
    let acquire = graph
        .add_node(queue, |builder| {
            AcquireNode::new(builder, swapchain, Vec::new(), None)
        })
        .unwrap();
    let acquired = graph.node(acquire).unwrap().acquired();
    let present = graph
        .add_node(queue, |builder| {
            PresentNode::new(builder, acquired, vk::PipelineStageFlags2::ALL_COMMANDS)
        })
        .unwrap();
    graph
        .add_edge(ImageEdge::new(
            graph.node(acquire).unwrap().image_usage(),
            graph.node(present).unwrap().image_usage(),
        ))
        .unwrap();
    graph.bake().unwrap();
    graph.execute().unwrap();
    graph.execute().unwrap();

    let acquire_semaphore = graph.node_semaphore(acquire.id()).unwrap();
    let present_semaphore = graph.node_semaphore(present.id()).unwrap();
    let submissions = device.submissions();
    assert_eq!(submissions.len(), 4);
    for (frame, pair) in submissions.chunks(2).enumerate() {
        let frame_count = 2 + frame as u64;
        let (acquire_submit, present_submit) = (&pair[0], &pair[1]);

        assert_eq!(acquire_submit.wait_semaphores.len(), 1);
        assert_eq!(acquire_submit.wait_semaphores[0].value, 0);
        assert_eq!(acquire_submit.signal_semaphores.len(), 1);
        assert_eq!(acquire_submit.signal_semaphores[0].semaphore, acquire_semaphore);
        assert_eq!(acquire_submit.signal_semaphores[0].value, frame_count);

        assert_eq!(present_submit.wait_semaphores.len(), 1);
        assert_eq!(present_submit.wait_semaphores[0].semaphore, acquire_semaphore);
        assert_eq!(present_submit.wait_semaphores[0].value, frame_count);
        assert_eq!(
            present_submit.wait_semaphores[0].stage_mask,
            vk::PipelineStageFlags2::ALL_COMMANDS
        );
        assert_eq!(present_submit.signal_semaphores.len(), 2);
        assert_eq!(present_submit.signal_semaphores[0].semaphore, present_semaphore);
        assert_eq!(present_submit.signal_semaphores[0].value, frame_count);
        assert_eq!(present_submit.signal_semaphores[1].value, 0);
    }
    assert_eq!(device.semaphore_value(present_semaphore), Some(3));
}

#[test]
fn execute_requires_bake() {
    let device = TestDevice::new();
    let mut graph = graph(&device, 2);
    graph
        .add_node(device.queue(0, vk::QueueFlags::GRAPHICS), |_| {
            Ok(Pass::default())
        })
        .unwrap();
    let error = graph.execute().unwrap_err();
    assert_eq!(
        error.downcast_ref::<RenderGraphError>(),
        Some(&RenderGraphError::NotBaked)
    );
    assert!(graph.wait().is_err());
    assert!(device.submissions().is_empty());
}

#[test]
fn cpu_waits_for_old_frames() {
    let device = TestDevice::new();
    device.set_hold_submissions(true);
    let mut create_info = RenderGraphCreateInfo::new(device.clone(), 2);
    create_info.wait_timeout = 0;
    let mut graph = RenderGraph::new(create_info).unwrap();
    let node = graph
        .add_node(device.queue(0, vk::QueueFlags::GRAPHICS), |_| {
            Ok(Pass::default())
        })
        .unwrap();
    graph.bake().unwrap();

    let timed_out = |result: anyhow::Result<()>| {
        result.unwrap_err().downcast_ref::<VkError>() == Some(&VkError::Vk(vk::Result::TIMEOUT))
    };

    graph.execute().unwrap();
    assert!(timed_out(graph.execute()));
    assert_eq!(graph.frame_count(), 3);
    assert_eq!(device.submissions().len(), 1);

    device.complete_pending();
    graph.execute().unwrap();
    graph.execute().unwrap();
    assert!(timed_out(graph.execute()));
    assert_eq!(graph.frame_count(), 5);
    assert_eq!(device.submissions().len(), 3);
    assert_eq!(graph.node(node).unwrap().rendered, 3);

    device.complete_pending();
    graph.wait_idle().unwrap();
    let semaphore = graph.node_semaphore(node.id()).unwrap();
    assert_eq!(device.semaphore_value(semaphore), Some(4));
}

#[test]
fn node_errors_propagate() {
    #[derive(Debug)]
    struct Failing;

    impl<D: Device> Node<D> for Failing {
        fn pre_render(&mut self, _ctx: &mut FrameContext<D>) -> anyhow::Result<()> {
            Ok(())
        }

        fn render(&mut self, _ctx: &mut RenderContext<D>) -> anyhow::Result<()> {
            Err(VkError::Vk(vk::Result::ERROR_DEVICE_LOST).into())
        }

        fn post_render(&mut self, _ctx: &mut FrameContext<D>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let device = TestDevice::new();
    let mut graph = graph(&device, 1);
    graph
        .add_node(device.queue(0, vk::QueueFlags::GRAPHICS), |_| Ok(Failing))
        .unwrap();
    graph.bake().unwrap();
    let error = graph.execute().unwrap_err();
    assert_eq!(
        error.downcast_ref::<VkError>(),
        Some(&VkError::Vk(vk::Result::ERROR_DEVICE_LOST))
    );
    assert!(device.submissions().is_empty());
    assert_eq!(graph.frame_count(), 1);
}
