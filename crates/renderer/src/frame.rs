//! Frame slots and the image-in-flight table.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on in_flight (CPU waits for the previous use of this slot)
//! 2. Acquire a drawable image (signals image_acquired)
//! 3. Wait on whatever fence still owns that image, then claim it
//! 4. Reset in_flight, record command_buffer
//! 5. Submit: wait image_acquired at color output, signal render_finished
//!    and in_flight
//! 6. Present (waits on render_finished)
//! ```

use ash::vk;
use tracing::debug;

use vkframe_rhi::RhiResult;
use vkframe_rhi::facade::DeviceFacade;

/// One reusable in-flight frame: a command buffer and its sync primitives.
///
/// Created once, reused every `K` frames, destroyed only at shutdown.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by the presentation engine when the acquired image is ready.
    pub image_acquired: vk::Semaphore,
    /// Signaled when this slot's rendering is done; presentation waits on it.
    pub render_finished: vk::Semaphore,
    /// Signaled when this slot's last submission has retired on the GPU.
    pub in_flight: vk::Fence,
}

impl FrameSlot {
    /// Creates the slot's primitives around an already allocated command
    /// buffer. The fence starts signaled so the first wait returns at once.
    ///
    /// Primitives created before a failure are destroyed again.
    pub fn create<D: DeviceFacade + ?Sized>(
        device: &D,
        command_buffer: vk::CommandBuffer,
    ) -> RhiResult<Self> {
        let image_acquired = device.create_semaphore()?;

        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_acquired);
                return Err(e);
            }
        };

        let in_flight = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(render_finished);
                device.destroy_semaphore(image_acquired);
                return Err(e);
            }
        };

        Ok(Self {
            command_buffer,
            image_acquired,
            render_finished,
            in_flight,
        })
    }

    /// Destroys the fence and semaphores. The command buffer is freed by its pool owner.
    pub fn destroy<D: DeviceFacade + ?Sized>(&self, device: &D) {
        device.destroy_fence(self.in_flight);
        device.destroy_semaphore(self.render_finished);
        device.destroy_semaphore(self.image_acquired);
    }
}

/// Maps each drawable image index to the fence of the slot that last
/// submitted work rendering into it.
///
/// The number of drawable images need not equal the number of slots, so an
/// image can still be in use by a different slot's submission when it is
/// acquired again.
#[derive(Clone, Debug, Default)]
pub struct ImagesInFlight {
    owners: Vec<Option<vk::Fence>>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Forgets every owner and resizes for a rebuilt chain.
    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
        debug!("Image-in-flight table reset for {} image(s)", image_count);
    }

    /// Fence that last claimed `image_index`, if any.
    pub fn owner(&self, image_index: u32) -> Option<vk::Fence> {
        self.owners.get(image_index as usize).copied().flatten()
    }

    /// Records `fence` as the owner of `image_index`, returning the previous owner.
    pub fn claim(&mut self, image_index: u32, fence: vk::Fence) -> Option<vk::Fence> {
        let index = image_index as usize;
        if index >= self.owners.len() {
            self.owners.resize(index + 1, None);
        }
        self.owners[index].replace(fence)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use vkframe_rhi::mock::MockDevice;

    #[test]
    fn test_slot_fence_starts_signaled() {
        let device = MockDevice::new();
        let slot = FrameSlot::create(&device, vk::CommandBuffer::null()).unwrap();

        assert_eq!(device.unsignaled_fence_count(), 0);
        device.wait_for_fences(&[slot.in_flight], 0).unwrap();
        assert_eq!(device.stats().blocking_fence_waits, 0);

        slot.destroy(&device);
        assert_eq!(device.live_fence_count(), 0);
        assert_eq!(device.live_semaphore_count(), 0);
    }

    #[test]
    fn test_claim_returns_previous_owner() {
        let mut table = ImagesInFlight::new(3);
        let a = vk::Fence::from_raw(1);
        let b = vk::Fence::from_raw(2);

        assert_eq!(table.owner(1), None);
        assert_eq!(table.claim(1, a), None);
        assert_eq!(table.owner(1), Some(a));
        assert_eq!(table.claim(1, b), Some(a));
        assert_eq!(table.owner(1), Some(b));
    }

    #[test]
    fn test_claim_grows_table() {
        let mut table = ImagesInFlight::new(1);
        table.claim(4, vk::Fence::from_raw(7));
        assert_eq!(table.len(), 5);
        assert_eq!(table.owner(4), Some(vk::Fence::from_raw(7)));
        assert_eq!(table.owner(9), None);
    }

    #[test]
    fn test_reset_forgets_owners() {
        let mut table = ImagesInFlight::new(2);
        table.claim(0, vk::Fence::from_raw(1));
        table.reset(3);
        assert_eq!(table.len(), 3);
        assert!((0..3).all(|i| table.owner(i).is_none()));
    }
}
