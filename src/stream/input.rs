//! Read-side frame stream.
//!
//! Opening a file performs the header handshake (magic, byte-order probes,
//! word sizes), then jumps to the end-of-file record and from it to the
//! table of contents.  Queries seek to a TOC-listed offset and read a
//! *cluster*: the structure at the offset plus however many follow-on
//! structures it takes to resolve the root's outgoing references.
//!
//! Reference resolution is two-pass.  Decoding a structure yields an object
//! with empty reference slots plus a list of (slot, target) fixups; decoded
//! objects enter the per-stream instance table and the fixup queue drains
//! whenever a target completes (a target is complete once its own fixups
//! have resolved, so chains resolve tail-first).  A fixup still pending
//! when the cluster hits the TOC boundary is a dangling reference, reported
//! with the offending class and instance ids.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::buffer::FrameBuffer;
use crate::checksum::{crc32, Crc32Filter};
use crate::error::{ChecksumScope, FrameError, FrameResult};
use crate::filter::StreamFilter;
use crate::objects::frameh::mask;
use crate::objects::{attach_child, ClassId, FrAdcData, FrDetector, FrEvent, FrObject,
    FrProcData, FrSerData, FrSimData, FrSimEvent, FrameH};
use crate::prefs::{display_level, ChecksumPolicy, StreamPrefs};
use crate::plan::ReadPlan;
use crate::spec::{self, has_struct_checksum, FRAME_SPEC_CURRENT};
use crate::stream::codec::{ByteOrder, RawRef, StructReader, WordSizes, SLOT_NEXT};
use crate::stream::header::{self, FileHeader};
use crate::stream::{end_of_file_struct_len, STRUCT_HEAD_BYTES};
use crate::toc::{self, ChannelKind, FrToc};

const C_TOC: i16 = ClassId::Toc as i16;
const C_EOF: i16 = ClassId::EndOfFile as i16;

// ─────────────────────────────────────────────────────────────────────────────
// Raw structures
// ─────────────────────────────────────────────────────────────────────────────

/// One structure as framed on disk: class, instance, and the body bytes.
/// Valid only until the stream's next read advances past it.
pub struct RawStructure {
    pub class: i16,
    pub instance: u32,
    /// Absolute offset of the structure's length field.
    pub offset: u64,
    /// Declared total length, including the length field and any trailing
    /// checksum.
    pub length: u64,
    image: Vec<u8>,
    body_end: usize,
    order: ByteOrder,
    file_size: u64,
}

impl RawStructure {
    /// A bounded reader over the structure body.  Reads that would cross
    /// the declared length fail with an Overrun error.
    pub fn reader(&self) -> StructReader<'_> {
        StructReader::new(
            &self.image[STRUCT_HEAD_BYTES as usize..self.body_end],
            self.order,
            self.offset + STRUCT_HEAD_BYTES,
        )
        .with_file_size(self.file_size)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver state
// ─────────────────────────────────────────────────────────────────────────────

struct Entry {
    obj: FrObject,
    /// Outgoing fixups of this object not yet resolved.
    unresolved: usize,
    /// Resolved "next structure of the same class" link.
    next_target: Option<RawRef>,
    /// Where the structure was framed, to tell re-reads from id collisions.
    offset: u64,
}

#[derive(Clone, Copy)]
struct Fixup {
    holder: RawRef,
    slot: u8,
    target: RawRef,
    noted_at: u64,
}

/// Which of a cluster root's fixups to discard before resolution.
enum Discard {
    /// Cut only the trailing next-of-class link (channel reads).
    ChannelNext,
    /// Frame-header subset read: keep only mask-selected sub-references.
    FrameMask(u32),
}

impl Discard {
    fn keeps(&self, slot: u8) -> bool {
        match self {
            Discard::ChannelNext => slot != SLOT_NEXT,
            Discard::FrameMask(m) => slot != SLOT_NEXT && mask::selects(*m, slot),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IFrameStream
// ─────────────────────────────────────────────────────────────────────────────

pub struct IFrameStream {
    buf: FrameBuffer,
    prefs: StreamPrefs,
    path: PathBuf,
    order: ByteOrder,
    word_sizes: WordSizes,
    file_version: u8,
    library_minor: u8,
    library_name: String,
    toc: Option<FrToc>,
    eof: Option<crate::objects::FrEndOfFile>,
    table: HashMap<RawRef, Entry>,
    fixups: Vec<Fixup>,
    warnings: u64,
    next_frame: usize,
    errored: bool,
}

impl IFrameStream {
    // ─────────────────────────────────────────────────────────────────────
    // Opening
    // ─────────────────────────────────────────────────────────────────────

    /// Open a frame file: handshake the header, read the end-of-file
    /// record, and parse the table of contents.
    pub fn open(path: &Path, prefs: &StreamPrefs) -> FrameResult<Self> {
        let mut stream = Self::open_without_toc(path, prefs)?;
        stream.load_toc()?;
        Ok(stream)
    }

    /// Open a frame file with a seed plan.  Only the end-of-file record is
    /// read before deciding: if the new file's frame count and run list
    /// match the seed's, its TOC is adopted (with stale position caches
    /// reset) and the TOC parse is skipped; otherwise the TOC is parsed
    /// afresh and the seed discarded.
    pub fn open_with_plan(path: &Path, prefs: &StreamPrefs, seed: &ReadPlan) -> FrameResult<Self> {
        let mut stream = Self::open_without_toc(path, prefs)?;
        let seek_toc = stream.require_eof()?.seek_toc;
        let n_frames = stream.require_eof()?.n_frames;
        if seed.n_frames() as u32 == n_frames {
            stream.buf.seek(seek_toc)?;
            let raw = stream.next_raw()?.ok_or_else(|| {
                FrameError::format(seek_toc, "end-of-file record points past end of file")
            })?;
            if raw.class == C_TOC {
                let mut r = raw.reader();
                let (_, runs) = toc::peek_runs(&mut r)?;
                if runs == seed.runs() {
                    let mut adopted = seed.clone_toc();
                    adopted.reset_caches();
                    stream.toc = Some(adopted);
                    return Ok(stream);
                }
            }
        }
        stream.load_toc()?;
        Ok(stream)
    }

    fn open_without_toc(path: &Path, prefs: &StreamPrefs) -> FrameResult<Self> {
        spec::initialize();
        let mut buf = FrameBuffer::open_read(path, prefs)?;

        let mut fixed = vec![0u8; header::fixed_prefix_len()];
        buf.read_exact(&mut fixed)?;
        let (hdr, _) = FileHeader::decode_fixed_prefix(&fixed)?;

        // Originating-library name, in the detected byte order.
        let mut len_bytes = [0u8; 2];
        buf.read_exact(&mut len_bytes)?;
        let name_len = match hdr.order {
            ByteOrder::LittleEndian => u16::from_le_bytes(len_bytes),
            ByteOrder::BigEndian => u16::from_be_bytes(len_bytes),
        } as usize;
        if name_len > header::MAX_LIBRARY_NAME {
            return Err(FrameError::format(
                header::fixed_prefix_len() as u64,
                format!("library name of {} bytes exceeds the header field", name_len),
            ));
        }
        let mut name = vec![0u8; name_len + 1];
        buf.read_exact(&mut name)?;
        if name[name_len] != 0 {
            return Err(FrameError::format(
                header::fixed_prefix_len() as u64,
                "library name missing trailing NUL",
            ));
        }
        let library_name = String::from_utf8_lossy(&name[..name_len]).into_owned();

        if !spec::is_supported(hdr.version) {
            return Err(FrameError::Unimplemented {
                version: hdr.version,
                what: "data-format version",
            });
        }

        let mut stream = IFrameStream {
            buf,
            prefs: prefs.clone(),
            path: path.to_path_buf(),
            order: hdr.order,
            word_sizes: hdr.word_sizes,
            file_version: hdr.version,
            library_minor: hdr.library_minor,
            library_name,
            toc: None,
            eof: None,
            table: HashMap::new(),
            fixups: Vec::new(),
            warnings: 0,
            next_frame: 0,
            errored: false,
        };
        stream.load_end_of_file()?;
        Ok(stream)
    }

    fn load_end_of_file(&mut self) -> FrameResult<()> {
        let len = end_of_file_struct_len(self.file_version);
        if self.buf.size() < len {
            return Err(FrameError::format(
                0,
                "file too short to hold an end-of-file record",
            ));
        }
        self.buf.seek_from_end(len)?;
        let raw = self
            .next_raw()?
            .ok_or_else(|| FrameError::format(self.buf.size(), "empty end-of-file region"))?;
        if raw.class != C_EOF {
            return Err(FrameError::format(
                raw.offset,
                format!(
                    "file is not terminated by an end-of-file record (found class {})",
                    raw.class
                ),
            ));
        }
        let mut r = raw.reader();
        let eof = crate::objects::FrEndOfFile {
            n_frames: r.read_u32()?,
            n_bytes: r.read_u64()?,
            seek_toc: r.read_u64()?,
            chk_sum: r.read_u32()?,
        };
        if eof.n_bytes != self.buf.size() {
            return Err(FrameError::format(
                raw.offset,
                format!(
                    "end-of-file record declares {} bytes, file holds {}",
                    eof.n_bytes,
                    self.buf.size()
                ),
            ));
        }
        self.eof = Some(eof);
        Ok(())
    }

    fn require_eof(&self) -> FrameResult<&crate::objects::FrEndOfFile> {
        self.eof
            .as_ref()
            .ok_or_else(|| FrameError::format(0, "stream has no end-of-file record"))
    }

    fn load_toc(&mut self) -> FrameResult<()> {
        let seek_toc = self.require_eof()?.seek_toc;
        self.buf.seek(seek_toc)?;
        let raw = self.next_raw()?.ok_or_else(|| {
            FrameError::format(seek_toc, "end-of-file record points past end of file")
        })?;
        if raw.class != C_TOC {
            return Err(FrameError::format(
                raw.offset,
                format!(
                    "end-of-file record does not point at the table of contents (class {})",
                    raw.class
                ),
            ));
        }
        let mut r = raw.reader();
        let (obj, _) = toc::decode(&mut r, self.file_version)?;
        let FrObject::Toc(t) = obj else { unreachable!() };
        self.toc = Some(t);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data-format version declared by the file.
    pub fn version(&self) -> u8 {
        self.file_version
    }

    pub fn endianness(&self) -> ByteOrder {
        self.order
    }

    pub fn word_sizes(&self) -> WordSizes {
        self.word_sizes
    }

    /// Name of the library that wrote the file.
    pub fn frame_library_name(&self) -> &str {
        &self.library_name
    }

    pub fn library_revision(&self) -> u8 {
        self.library_minor
    }

    pub fn n_frames(&self) -> u32 {
        self.eof.as_ref().map(|e| e.n_frames).unwrap_or(0)
    }

    pub fn toc(&self) -> FrameResult<&FrToc> {
        self.toc
            .as_ref()
            .ok_or_else(|| FrameError::format(0, "stream has no table of contents"))
    }

    /// Structures skipped or downgraded to warnings so far.
    pub fn warnings(&self) -> u64 {
        self.warnings
    }

    pub fn tell(&self) -> u64 {
        self.buf.tell()
    }

    pub fn seek(&mut self, offset: u64) -> FrameResult<()> {
        self.buf.seek(offset)
    }

    /// Install a streaming filter at the current read position.  Mutating
    /// filters are refused on memory-mapped streams.
    pub fn add_filter(&mut self, filter: Box<dyn StreamFilter>) -> FrameResult<()> {
        self.buf.add_filter(filter)
    }

    pub fn remove_filter(&mut self, name: &str) -> Option<Box<dyn StreamFilter>> {
        self.buf.remove_filter(name)
    }

    pub fn bytes_filtered(&self) -> u64 {
        self.buf.bytes_filtered()
    }

    /// Clone the parsed TOC and its position caches into a reusable plan.
    pub fn extract_plan(&self) -> FrameResult<ReadPlan> {
        Ok(ReadPlan::new(self.toc()?.clone()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Structure framing
    // ─────────────────────────────────────────────────────────────────────

    /// Read the structure at the current position.  Returns `None` at end
    /// of file.  The structure's trailing CRC (at versions that carry one)
    /// is verified here, subject to the stream's checksum policy.
    pub fn read_structure(&mut self) -> FrameResult<Option<RawStructure>> {
        if self.errored {
            return Err(FrameError::domain("stream is errored; no further reads"));
        }
        self.next_raw()
    }

    fn next_raw(&mut self) -> FrameResult<Option<RawStructure>> {
        let offset = self.buf.tell();
        let size = self.buf.size();
        if offset >= size {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 8];
        self.buf.read_exact(&mut len_bytes)?;
        let length = match self.order {
            ByteOrder::LittleEndian => u64::from_le_bytes(len_bytes),
            ByteOrder::BigEndian => u64::from_be_bytes(len_bytes),
        };
        let crc_len: u64 = if has_struct_checksum(self.file_version) {
            4
        } else {
            0
        };
        if length < STRUCT_HEAD_BYTES + crc_len {
            self.errored = true;
            return Err(FrameError::format(
                offset,
                format!("structure length {} is not self-consistent", length),
            ));
        }
        if offset + length > size {
            self.errored = true;
            return Err(FrameError::Underrun {
                offset,
                declared: length,
                available: size - offset,
            });
        }
        let mut image = vec![0u8; length as usize];
        image[..8].copy_from_slice(&len_bytes);
        self.buf.read_exact(&mut image[8..])?;

        let mut head = StructReader::new(&image[8..14], self.order, offset + 8);
        let class = head.read_i16()?;
        let instance = head.read_u32()?;

        if crc_len == 4 && self.prefs.checksum_policy != ChecksumPolicy::Ignore {
            let stored_bytes: [u8; 4] = image[image.len() - 4..].try_into().unwrap();
            let stored = match self.order {
                ByteOrder::LittleEndian => u32::from_le_bytes(stored_bytes),
                ByteOrder::BigEndian => u32::from_be_bytes(stored_bytes),
            };
            let computed = crc32(&image[..image.len() - 4]);
            if stored != computed {
                let err = FrameError::Checksum {
                    offset: offset + length - 4,
                    expected: stored,
                    observed: computed,
                    scope: ChecksumScope::Structure,
                };
                match self.prefs.checksum_policy {
                    ChecksumPolicy::Enforce => return Err(err),
                    ChecksumPolicy::Warn => {
                        self.warnings += 1;
                        display_level(2, &format!("warning: {}", err));
                    }
                    ChecksumPolicy::Ignore => unreachable!(),
                }
            }
        }

        Ok(Some(RawStructure {
            class,
            instance,
            offset,
            length,
            body_end: (length - crc_len) as usize,
            image,
            order: self.order,
            file_size: size,
        }))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reference resolution
    // ─────────────────────────────────────────────────────────────────────

    /// Decode a framed structure into the instance table and enqueue its
    /// fixups.  Returns the table key, or `None` when the structure was
    /// skipped (unknown class in permissive mode, or a framing boundary).
    fn absorb_structure(&mut self, raw: &RawStructure) -> FrameResult<Option<RawRef>> {
        if raw.class == C_TOC || raw.class == C_EOF {
            return Ok(None);
        }
        let key = RawRef::new(raw.class, raw.instance);
        if let Some(existing) = self.table.get(&key) {
            if existing.offset == raw.offset {
                // Cluster scans overlap; re-reading a decoded structure is
                // a no-op.
                return Ok(Some(key));
            }
            self.errored = true;
            return Err(FrameError::format(
                raw.offset,
                format!(
                    "instance id {} of class {} already used at byte {}",
                    raw.instance, raw.class, existing.offset
                ),
            ));
        }

        let registry =
            spec::registry_for(self.file_version).expect("file version validated at open");
        let Some(entry) = registry.entry(raw.class) else {
            if self.prefs.permissive_schema {
                self.warnings += 1;
                display_level(
                    2,
                    &format!(
                        "warning: skipping unknown class {} at byte {}",
                        raw.class, raw.offset
                    ),
                );
                return Ok(None);
            }
            return Err(FrameError::Schema {
                version: self.file_version,
                class: raw.class,
                offset: raw.offset,
                what: "class-id not in registry for this version".into(),
            });
        };

        let mut r = raw.reader();
        let (obj, pending) = (entry.decode)(&mut r, self.file_version)?;

        // An FrSH must agree with the registered description of its class.
        if let FrObject::Sh(sh) = &obj {
            if let Some(class) = ClassId::from_i16(sh.class) {
                if sh.name != class.struct_name() {
                    let err = FrameError::Schema {
                        version: self.file_version,
                        class: sh.class,
                        offset: raw.offset,
                        what: format!(
                            "FrSH names class {} '{}', registry calls it '{}'",
                            sh.class,
                            sh.name,
                            class.struct_name()
                        ),
                    };
                    if self.prefs.permissive_schema {
                        self.warnings += 1;
                        display_level(2, &format!("warning: {}", err));
                    } else {
                        return Err(err);
                    }
                }
            }
        }

        for p in &pending {
            self.fixups.push(Fixup {
                holder: key,
                slot: p.slot,
                target: p.target,
                noted_at: raw.offset,
            });
        }
        self.table.insert(
            key,
            Entry {
                obj,
                unresolved: pending.len(),
                next_target: None,
                offset: raw.offset,
            },
        );
        Ok(Some(key))
    }

    fn is_complete(&self, key: RawRef) -> bool {
        self.table
            .get(&key)
            .map(|e| e.unresolved == 0)
            .unwrap_or(false)
    }

    /// Resolve every fixup whose target is complete, repeating until no
    /// further progress is possible.
    fn drain(&mut self) -> FrameResult<()> {
        loop {
            let mut progressed = false;
            let mut i = 0;
            while i < self.fixups.len() {
                let f = self.fixups[i];
                if self.is_complete(f.target) {
                    self.fixups.swap_remove(i);
                    self.resolve(f)?;
                    progressed = true;
                } else {
                    i += 1;
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    fn resolve(&mut self, f: Fixup) -> FrameResult<()> {
        if f.slot == SLOT_NEXT {
            let holder = self
                .table
                .get_mut(&f.holder)
                .expect("fixup holders outlive their fixups");
            holder.next_target = Some(f.target);
            holder.unresolved -= 1;
            return Ok(());
        }

        // Collect the target and its next-of-class chain, all complete by
        // the drain invariant.  A cycle would never complete, so the walk
        // is bounded; the visited guard protects against table corruption.
        let mut chain = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut cursor = Some(f.target);
        while let Some(t) = cursor {
            if !visited.insert(t) {
                return Err(FrameError::format(
                    f.noted_at,
                    format!(
                        "next-of-class chain cycles through class {} instance {}",
                        t.class, t.instance
                    ),
                ));
            }
            let entry = self.table.get(&t).ok_or(FrameError::DanglingReference {
                class: t.class,
                instance: t.instance,
                offset: f.noted_at,
            })?;
            chain.push(entry.obj.clone());
            cursor = entry.next_target;
        }

        let holder = self
            .table
            .get_mut(&f.holder)
            .expect("fixup holders outlive their fixups");
        for child in chain {
            attach_child(&mut holder.obj, f.slot, child)?;
        }
        holder.unresolved -= 1;
        Ok(())
    }

    /// Drop root fixups the caller does not want chased, before resolution
    /// can pull their targets in.
    fn discard_root_fixups(&mut self, key: RawRef, policy: &Discard) {
        let mut removed = 0usize;
        self.fixups.retain(|f| {
            if f.holder == key && !policy.keeps(f.slot) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if let Some(e) = self.table.get_mut(&key) {
            e.unresolved -= removed;
        }
    }

    /// Read the structure at `offset` plus whatever follows until its
    /// references resolve, and return the assembled object.
    fn read_cluster(
        &mut self,
        offset: u64,
        expect_class: i16,
        policy: &Discard,
    ) -> FrameResult<FrObject> {
        self.buf.seek(offset)?;
        let raw = self
            .next_raw()?
            .ok_or_else(|| FrameError::format(offset, "offset beyond end of file"))?;
        if raw.class != expect_class {
            return Err(FrameError::Schema {
                version: self.file_version,
                class: raw.class,
                offset: raw.offset,
                what: format!(
                    "offset leads to class {}, expected {}",
                    raw.class, expect_class
                ),
            });
        }
        let key = RawRef::new(raw.class, raw.instance);
        if let Some(existing) = self.table.get(&key) {
            if existing.unresolved == 0 && existing.offset == raw.offset {
                return Ok(existing.obj.clone());
            }
        }
        let Some(key) = self.absorb_structure(&raw)? else {
            return Err(FrameError::format(raw.offset, "structure was skipped"));
        };
        // Unwanted root references must go before any resolution can chase
        // them.
        self.discard_root_fixups(key, policy);
        self.drain()?;

        while !self.is_complete(key) {
            let Some(raw) = self.next_raw()? else { break };
            if raw.class == C_TOC || raw.class == C_EOF {
                break;
            }
            match self.absorb_structure(&raw) {
                Ok(_) => self.drain()?,
                Err(e) if e.is_stream_level() => {
                    self.errored = true;
                    return Err(e);
                }
                Err(e) => {
                    self.warnings += 1;
                    display_level(2, &format!("warning: skipping structure: {}", e));
                }
            }
        }

        if !self.is_complete(key) {
            // Some reference in the cluster never found its target.
            let f = self
                .fixups
                .iter()
                .find(|f| !self.table.contains_key(&f.target))
                .or_else(|| self.fixups.iter().find(|f| f.holder == key));
            return Err(match f {
                Some(f) => FrameError::DanglingReference {
                    class: f.target.class,
                    instance: f.target.instance,
                    offset: f.noted_at,
                },
                None => FrameError::format(offset, "cluster failed to resolve"),
            });
        }
        Ok(self.table[&key].obj.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    fn promote_to_current(&self, obj: FrObject) -> FrameResult<FrObject> {
        spec::promote(obj, self.file_version, FRAME_SPEC_CURRENT)
    }

    /// Read the frame header of frame `index`.  `element_mask` selects
    /// which optional sub-references are resolved (see
    /// [`crate::objects::frameh::mask`]); unselected references are
    /// discarded, not chased.
    pub fn read_frame_h(&mut self, index: usize, element_mask: u32) -> FrameResult<FrameH> {
        let position = self
            .toc()?
            .frame(index)
            .ok_or_else(|| {
                FrameError::domain(format!("file has no frame {} in its table of contents", index))
            })?
            .position_h;
        let obj = self.read_cluster(
            position,
            ClassId::FrameH as i16,
            &Discard::FrameMask(element_mask),
        )?;
        self.promote_to_current(obj)?.expect_frame_h()
    }

    /// Sequential frame iteration; `None` after the last frame.
    pub fn read_next_frame(&mut self) -> FrameResult<Option<FrameH>> {
        if self.next_frame >= self.n_frames() as usize {
            return Ok(None);
        }
        let index = self.next_frame;
        let frame = self.read_frame_h(index, mask::ALL)?;
        self.next_frame = index + 1;
        Ok(Some(frame))
    }

    fn read_channel_object(
        &mut self,
        kind: ChannelKind,
        frame: usize,
        name: &str,
    ) -> FrameResult<FrObject> {
        let order = self.order;
        let toc = self
            .toc
            .as_mut()
            .ok_or_else(|| FrameError::format(0, "stream has no table of contents"))?;
        let position = toc
            .position(kind, name, frame, &mut self.buf, order)?
            .ok_or_else(|| {
                FrameError::domain(format!(
                    "no TOC entry for channel '{}' in frame {}",
                    name, frame
                ))
            })?;
        let class = channel_class(kind);
        let obj = self.read_cluster(position, class as i16, &Discard::ChannelNext)?;
        self.promote_to_current(obj)
    }

    pub fn read_adc(&mut self, frame: usize, name: &str) -> FrameResult<FrAdcData> {
        self.read_channel_object(ChannelKind::Adc, frame, name)?
            .expect_adc()
    }

    pub fn read_proc(&mut self, frame: usize, name: &str) -> FrameResult<FrProcData> {
        self.read_channel_object(ChannelKind::Proc, frame, name)?
            .expect_proc()
    }

    pub fn read_ser(&mut self, frame: usize, name: &str) -> FrameResult<FrSerData> {
        self.read_channel_object(ChannelKind::Ser, frame, name)?
            .expect_ser()
    }

    pub fn read_sim(&mut self, frame: usize, name: &str) -> FrameResult<FrSimData> {
        self.read_channel_object(ChannelKind::Sim, frame, name)?
            .expect_sim()
    }

    pub fn read_event(&mut self, frame: usize, name: &str) -> FrameResult<FrEvent> {
        self.read_channel_object(ChannelKind::Event, frame, name)?
            .expect_event()
    }

    pub fn read_sim_event(&mut self, frame: usize, name: &str) -> FrameResult<FrSimEvent> {
        self.read_channel_object(ChannelKind::SimEvent, frame, name)?
            .expect_sim_event()
    }

    /// Read a channel by its position in the TOC's channel list.  ADC and
    /// proc channels only.
    pub fn read_channel_by_index(
        &mut self,
        kind: ChannelKind,
        frame: usize,
        index: usize,
    ) -> FrameResult<FrObject> {
        if !matches!(kind, ChannelKind::Adc | ChannelKind::Proc) {
            return Err(FrameError::domain(
                "indexed channel reads cover ADC and proc channels only",
            ));
        }
        let name = self
            .toc()?
            .channel_names(kind)
            .get(index)
            .ok_or_else(|| {
                FrameError::domain(format!("channel index {} out of range", index))
            })?
            .clone();
        self.read_channel_object(kind, frame, &name)
    }

    /// Flat event indexing: the `occurrence`-th event of the given type
    /// across the whole file.
    pub fn read_event_by_type(&mut self, type_name: &str, occurrence: usize) -> FrameResult<FrEvent> {
        self.read_event_object_by_type(ChannelKind::Event, type_name, occurrence)?
            .expect_event()
    }

    pub fn read_sim_event_by_type(
        &mut self,
        type_name: &str,
        occurrence: usize,
    ) -> FrameResult<FrSimEvent> {
        self.read_event_object_by_type(ChannelKind::SimEvent, type_name, occurrence)?
            .expect_sim_event()
    }

    fn read_event_object_by_type(
        &mut self,
        kind: ChannelKind,
        type_name: &str,
        occurrence: usize,
    ) -> FrameResult<FrObject> {
        let order = self.order;
        let toc = self
            .toc
            .as_mut()
            .ok_or_else(|| FrameError::format(0, "stream has no table of contents"))?;
        let position = toc
            .event_position(kind, type_name, occurrence, &mut self.buf, order)?
            .ok_or_else(|| {
                FrameError::domain(format!(
                    "no event of type '{}' at occurrence {}",
                    type_name, occurrence
                ))
            })?;
        let obj = self.read_cluster(position, channel_class(kind) as i16, &Discard::ChannelNext)?;
        self.promote_to_current(obj)
    }

    /// Read a detector by name from the first frame's header.
    pub fn read_detector(&mut self, name: &str) -> FrameResult<FrDetector> {
        let frame = self.read_frame_h(0, mask::DETECT_SIM | mask::DETECT_PROC)?;
        for det in [frame.detect_proc, frame.detect_sim].into_iter().flatten() {
            if det.name == name {
                return Ok(*det);
            }
        }
        Err(FrameError::domain(format!(
            "file carries no detector named '{}'",
            name
        )))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Whole-file verification
    // ─────────────────────────────────────────────────────────────────────

    /// Sequentially re-scan the file, verifying every structure checksum
    /// and the whole-file checksum in the end-of-file record.
    pub fn verify(&mut self) -> FrameResult<()> {
        const VERIFY_FILTER: &str = "verify-crc32";
        self.buf.seek(0)?;
        let (filter, handle) = Crc32Filter::new(VERIFY_FILTER);
        self.buf.add_filter(Box::new(filter))?;
        let result = self.verify_scan(&handle);
        self.buf.remove_filter(VERIFY_FILTER);
        result
    }

    fn verify_scan(&mut self, file_crc: &crate::checksum::Crc32Handle) -> FrameResult<()> {
        let size = self.buf.size();
        let header_len = header::fixed_prefix_len() + 2 + self.library_name.len() + 1;
        let mut header_bytes = vec![0u8; header_len];
        self.buf.read_exact(&mut header_bytes)?;

        let with_crc = has_struct_checksum(self.file_version);
        loop {
            let offset = self.buf.tell();
            if offset >= size {
                return Err(FrameError::format(offset, "no end-of-file record found"));
            }
            let mut head = vec![0u8; STRUCT_HEAD_BYTES as usize];
            self.buf.read_exact(&mut head)?;
            let mut hr = StructReader::new(&head, self.order, offset);
            let length = hr.read_u64()?;
            let class = hr.read_i16()?;
            let _instance = hr.read_u32()?;
            let crc_len: u64 = if with_crc { 4 } else { 0 };
            if length < STRUCT_HEAD_BYTES + crc_len || offset + length > size {
                return Err(FrameError::format(
                    offset,
                    format!("structure length {} is not self-consistent", length),
                ));
            }

            if class == C_EOF {
                // Fields before the checksum slot.
                let mut fields = [0u8; 20];
                self.buf.read_exact(&mut fields)?;
                self.buf.sync_filters();
                let observed = file_crc.value();

                let mut slot = [0u8; 4];
                self.buf.read_exact(&mut slot)?;
                let declared = match self.order {
                    ByteOrder::LittleEndian => u32::from_le_bytes(slot),
                    ByteOrder::BigEndian => u32::from_be_bytes(slot),
                };
                if declared != observed {
                    return Err(FrameError::Checksum {
                        offset: offset + STRUCT_HEAD_BYTES + 20,
                        expected: declared,
                        observed,
                        scope: ChecksumScope::File,
                    });
                }
                if with_crc {
                    let mut struct_crc = [0u8; 4];
                    self.buf.read_exact(&mut struct_crc)?;
                    let stored = match self.order {
                        ByteOrder::LittleEndian => u32::from_le_bytes(struct_crc),
                        ByteOrder::BigEndian => u32::from_be_bytes(struct_crc),
                    };
                    let mut image = head.clone();
                    image.extend_from_slice(&fields);
                    image.extend_from_slice(&slot);
                    let computed = crc32(&image);
                    if stored != computed {
                        return Err(FrameError::Checksum {
                            offset: offset + length - 4,
                            expected: stored,
                            observed: computed,
                            scope: ChecksumScope::Structure,
                        });
                    }
                }
                return Ok(());
            }

            let mut rest = vec![0u8; (length - STRUCT_HEAD_BYTES) as usize];
            self.buf.read_exact(&mut rest)?;
            if with_crc {
                let stored_bytes: [u8; 4] = rest[rest.len() - 4..].try_into().unwrap();
                let stored = match self.order {
                    ByteOrder::LittleEndian => u32::from_le_bytes(stored_bytes),
                    ByteOrder::BigEndian => u32::from_be_bytes(stored_bytes),
                };
                let mut image = head.clone();
                image.extend_from_slice(&rest[..rest.len() - 4]);
                let computed = crc32(&image);
                if stored != computed {
                    return Err(FrameError::Checksum {
                        offset: offset + length - 4,
                        expected: stored,
                        observed: computed,
                        scope: ChecksumScope::Structure,
                    });
                }
            }
        }
    }
}

fn channel_class(kind: ChannelKind) -> ClassId {
    match kind {
        ChannelKind::Adc => ClassId::AdcData,
        ChannelKind::Proc => ClassId::ProcData,
        ChannelKind::Ser => ClassId::SerData,
        ChannelKind::Sim => ClassId::SimData,
        ChannelKind::SimEvent => ClassId::SimEvent,
        ChannelKind::Event => ClassId::Event,
    }
}
