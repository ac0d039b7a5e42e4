use super::{ERASED_WORD, Flash, FlashDevice, FlashError, FlashId, PollLimit, Result, identify};
use crate::hal::{FlashBus, Vblank};

/// One reflash of the cartridge: identify the chips, erase them and write an
/// image page by page.
pub struct Programmer<'a, B: ?Sized> {
    bus: &'a mut B,
    poll_limit: PollLimit,
}

impl<'a, B> Programmer<'a, B>
where
    B: FlashBus + Vblank + ?Sized,
{
    pub fn new(bus: &'a mut B) -> Self {
        Self {
            bus,
            poll_limit: PollLimit::UNBOUNDED,
        }
    }

    pub fn with_poll_limit(mut self, poll_limit: PollLimit) -> Self {
        self.poll_limit = poll_limit;
        self
    }

    pub fn identify(&mut self) -> (FlashId, FlashDevice) {
        let id = identify(self.bus);
        (id, id.resolve())
    }

    /// Erase the cartridge and program `image` from word 0.
    ///
    /// The image is packed into big-endian words; a trailing odd byte and
    /// the rest of the final page are filled with the erased value.
    /// `progress` is called with `(page, pages)` before each page.
    pub fn program<F>(&mut self, image: &[u8], mut progress: F) -> Result<FlashDevice>
    where
        F: FnMut(u32, u32),
    {
        let (id, device) = self.identify();
        tracing::info!(
            "vendor 0x{:04X} ({}), device 0x{:04X} ({})",
            id.vendor,
            device.vendor(),
            id.device,
            device.device()
        );
        if !device.is_present() {
            return Err(FlashError::NoDevice);
        }

        let words = image.len().div_ceil(2);
        if words > device.rom_size() as usize {
            return Err(FlashError::ImageTooLarge {
                words,
                capacity: device.rom_size(),
            });
        }

        let page_size = device.page_size() as usize;
        let pages = words.div_ceil(page_size) as u32;

        let mut flash = Flash::new(&mut *self.bus, device).with_poll_limit(self.poll_limit);
        flash.erase_all()?;

        for page in 0..pages {
            progress(page, pages);
            let start = (page as usize * page_size * 2).min(image.len());
            let end = (start + page_size * 2).min(image.len());
            let page_words = image[start..end]
                .chunks(2)
                .map(|pair| match *pair {
                    [hi, lo] => u16::from_be_bytes([hi, lo]),
                    [hi] => u16::from_be_bytes([hi, 0xFF]),
                    _ => ERASED_WORD,
                })
                .chain(core::iter::repeat(ERASED_WORD))
                .take(page_size);
            flash.write_page_words(page, page_words)?;
        }

        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ChipModel, SimFlash};

    #[test]
    fn refuses_absent_device_without_writing() {
        let mut chip = SimFlash::absent();
        let result = Programmer::new(&mut chip).program(&[0u8; 16], |_, _| {});
        assert_eq!(result, Err(FlashError::NoDevice));
        assert!(
            !chip
                .writes()
                .iter()
                .any(|&(_, value)| value == 0xA0A0 || value == 0x8080)
        );
    }

    #[test]
    fn programs_image_and_pads_final_page() {
        let mut chip = SimFlash::new(ChipModel::PageWrite, 0x1F1F, 0xD5D5, 131072);
        chip.fill(0x0000);
        let image: Vec<u8> = (0..301u32).map(|i| i as u8).collect();

        let mut seen = Vec::new();
        let device = Programmer::new(&mut chip)
            .program(&image, |page, pages| seen.push((page, pages)))
            .unwrap();

        assert_eq!(device.device(), "Device: AT29C010");
        // 151 words span two 128-word pages
        assert_eq!(seen, vec![(0, 2), (1, 2)]);
        assert_eq!(chip.words(0, 1), &[0x0001]);
        assert_eq!(chip.words(149, 1), &[0x2A2B]);
        assert_eq!(chip.words(150, 1), &[0x2CFF]);
        assert!(chip.words(151, 256 - 151).iter().all(|&w| w == 0xFFFF));
        // erase_all cleared everything beyond the image
        assert!(chip.words(256, 131072 - 256).iter().all(|&w| w == 0xFFFF));
    }

    #[test]
    fn programs_sequenced_chip() {
        let mut chip = SimFlash::new(ChipModel::Sequenced, 0xBFBF, 0xB5B5, 131072)
            .with_sector_size(4096)
            .with_busy_reads(1);
        chip.fill(0x0000);
        let image = [0xDE, 0xAD, 0xBE, 0xEF];

        Programmer::new(&mut chip)
            .with_poll_limit(PollLimit::reads(16))
            .program(&image, |_, _| {})
            .unwrap();

        assert_eq!(chip.words(0, 3), &[0xDEAD, 0xBEEF, 0xFFFF]);
    }

    #[test]
    fn rejects_oversized_image() {
        let mut chip = SimFlash::new(ChipModel::PageWrite, 0xBFBF, 0x0707, 131072);
        let image = vec![0u8; 131072 * 2 + 2];
        assert_eq!(
            Programmer::new(&mut chip).program(&image, |_, _| {}),
            Err(FlashError::ImageTooLarge {
                words: 131073,
                capacity: 131072
            })
        );
    }
}
