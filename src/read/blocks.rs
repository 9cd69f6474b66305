//! Prefix-sum tables mapping files to folders and folders to pack
//! extents.

use crate::format::files::FileItem;
use crate::format::streams::Folder;
use crate::{Error, Result};

/// Index tables built once at open time.
#[derive(Debug, Clone, Default)]
pub(crate) struct BlockIndex {
    /// First pack-stream index of each folder.
    pub folder_start_pack_stream: Vec<u32>,
    /// Offset of each pack stream from the first pack byte.
    pub pack_stream_start_pos: Vec<u64>,
    /// First file index contained in each folder.
    pub folder_start_file: Vec<u32>,
    /// Folder holding each file; `None` for empty items outside any
    /// folder.
    pub file_to_folder: Vec<Option<u32>>,
}

impl BlockIndex {
    /// Builds the tables, walking files into folders and skipping
    /// folders that carry no substreams.
    pub fn build(folders: &[Folder], pack_sizes: &[u64], files: &[FileItem]) -> Result<Self> {
        let mut index = BlockIndex {
            folder_start_pack_stream: Vec::with_capacity(folders.len()),
            pack_stream_start_pos: Vec::with_capacity(pack_sizes.len()),
            folder_start_file: vec![0; folders.len()],
            file_to_folder: vec![None; files.len()],
        };

        let mut start = 0u32;
        for folder in folders {
            index.folder_start_pack_stream.push(start);
            start += folder.packed_streams.len() as u32;
        }

        let mut pos = 0u64;
        for &size in pack_sizes {
            index.pack_stream_start_pos.push(pos);
            pos += size;
        }

        let mut folder_index = 0usize;
        let mut index_in_folder = 0u32;
        for (i, file) in files.iter().enumerate() {
            let empty = !file.has_stream;
            if empty && index_in_folder == 0 {
                continue;
            }
            if index_in_folder == 0 {
                loop {
                    if folder_index >= folders.len() {
                        return Err(Error::Archive {
                            offset: 0,
                            reason: "more file streams than folders provide".into(),
                        });
                    }
                    index.folder_start_file[folder_index] = i as u32;
                    if folders[folder_index].num_unpack_streams != 0 {
                        break;
                    }
                    folder_index += 1;
                }
            }
            index.file_to_folder[i] = Some(folder_index as u32);
            if empty {
                continue;
            }
            index_in_folder += 1;
            if index_in_folder >= folders[folder_index].num_unpack_streams {
                folder_index += 1;
                index_in_folder = 0;
            }
        }

        Ok(index)
    }

    /// Absolute position of a folder's pack stream, given the position
    /// of the first pack byte.
    pub fn folder_stream_pos(&self, data_pos: u64, folder_index: u32, in_folder: u32) -> u64 {
        let stream = self.folder_start_pack_stream[folder_index as usize] + in_folder;
        data_pos + self.pack_stream_start_pos[stream as usize]
    }
}
