//! Versioned binary form of the mirror.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::data::{
    AddressHash, AddressId, BlockHash, BlockHeight, CertificateKind, ChainKind, Digest, OutPoint,
    OutputId, TransactionId, TxHash, WalletId,
};
use crate::ledger::tables::{
    Address, BlockRecord, CertificateRecord, LastSyncInfo, Tables, TransactionRecord, UtxoInput,
    UtxoOutput,
};
use crate::wallet::confirmation_status::{ConfirmationStatus, SpendStatus};

fn bad_data(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what.to_string())
}

fn read_hash32<R: Read>(mut reader: R) -> io::Result<[u8; 32]> {
    let mut bytes = [0u8; 32];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn write_optional<W: Write, T>(
    mut writer: W,
    value: &Option<T>,
    write_value: impl FnOnce(&mut W, &T) -> io::Result<()>,
) -> io::Result<()> {
    match value {
        None => writer.write_u8(0),
        Some(value) => {
            writer.write_u8(1)?;
            write_value(&mut writer, value)
        }
    }
}

fn read_optional<R: Read, T>(
    mut reader: R,
    read_value: impl FnOnce(&mut R) -> io::Result<T>,
) -> io::Result<Option<T>> {
    match reader.read_u8()? {
        0 => Ok(None),
        1 => Ok(Some(read_value(&mut reader)?)),
        other => Err(bad_data(&format!("bad option flag {}", other))),
    }
}

fn write_string<W: Write>(mut writer: W, value: &str) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(value.len() as u32)?;
    writer.write_all(value.as_bytes())
}

fn read_string<R: Read>(mut reader: R) -> io::Result<String> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| bad_data("string is not utf-8"))
}

fn write_bytes<W: Write>(mut writer: W, value: &[u8]) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(value.len() as u32)?;
    writer.write_all(value)
}

fn read_bytes<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

impl Address {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.id.into())?;
        writer.write_all(self.hash.as_bytes())?;
        writer.write_u8(self.chain.tag())?;
        writer.write_u32::<LittleEndian>(self.derivation_index)?;
        writer.write_u8(self.is_used as u8)?;
        writer.write_u32::<LittleEndian>(self.wallet.into())
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let id = AddressId::from_u64(reader.read_u64::<LittleEndian>()?);
        let hash = AddressHash::from_bytes(read_hash32(&mut reader)?);
        let chain = ChainKind::from_tag(reader.read_u8()?).ok_or_else(|| bad_data("bad chain tag"))?;
        let derivation_index = reader.read_u32::<LittleEndian>()?;
        let is_used = reader.read_u8()? != 0;
        let wallet = WalletId::from_u32(reader.read_u32::<LittleEndian>()?);
        Ok(Address {
            id,
            hash,
            chain,
            derivation_index,
            is_used,
            wallet,
        })
    }
}

impl ConfirmationStatus {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        match self {
            ConfirmationStatus::Pending => writer.write_u8(0),
            ConfirmationStatus::Confirmed(height) => {
                writer.write_u8(1)?;
                writer.write_u64::<LittleEndian>(u64::from(*height))
            }
            ConfirmationStatus::Failed => writer.write_u8(2),
            ConfirmationStatus::Reorganized => writer.write_u8(3),
            ConfirmationStatus::Dropped => writer.write_u8(4),
        }
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        match reader.read_u8()? {
            0 => Ok(ConfirmationStatus::Pending),
            1 => Ok(ConfirmationStatus::Confirmed(BlockHeight::from_u64(
                reader.read_u64::<LittleEndian>()?,
            ))),
            2 => Ok(ConfirmationStatus::Failed),
            3 => Ok(ConfirmationStatus::Reorganized),
            4 => Ok(ConfirmationStatus::Dropped),
            other => Err(bad_data(&format!("bad status tag {}", other))),
        }
    }
}

impl SpendStatus {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        match self {
            SpendStatus::Unspent => writer.write_u8(0),
            SpendStatus::PendingSpend(spender) => {
                writer.write_u8(1)?;
                writer.write_u64::<LittleEndian>((*spender).into())
            }
            SpendStatus::Spent(spender) => {
                writer.write_u8(2)?;
                writer.write_u64::<LittleEndian>((*spender).into())
            }
        }
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        match reader.read_u8()? {
            0 => Ok(SpendStatus::Unspent),
            1 => Ok(SpendStatus::PendingSpend(TransactionId::from_u64(
                reader.read_u64::<LittleEndian>()?,
            ))),
            2 => Ok(SpendStatus::Spent(TransactionId::from_u64(
                reader.read_u64::<LittleEndian>()?,
            ))),
            other => Err(bad_data(&format!("bad spend tag {}", other))),
        }
    }
}

impl TransactionRecord {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.id.into())?;
        writer.write_all(self.tx_hash.as_bytes())?;
        self.status.write(&mut writer)?;
        write_optional(&mut writer, &self.block, |w, block| w.write_all(block.as_bytes()))?;
        write_optional(&mut writer, &self.ordinal, |w, ordinal| {
            w.write_u32::<LittleEndian>(*ordinal)
        })?;
        writer.write_all(self.digest.as_bytes())?;
        writer.write_u64::<LittleEndian>(self.last_update_time)?;
        write_optional(&mut writer, &self.error_message, |w, message| {
            write_string(w, message)
        })
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let id = TransactionId::from_u64(reader.read_u64::<LittleEndian>()?);
        let tx_hash = TxHash::from_bytes(read_hash32(&mut reader)?);
        let status = ConfirmationStatus::read(&mut reader)?;
        let block = read_optional(&mut reader, |r| Ok(BlockHash::from_bytes(read_hash32(r)?)))?;
        let ordinal = read_optional(&mut reader, |r| r.read_u32::<LittleEndian>())?;
        let digest = Digest::from_bytes(read_hash32(&mut reader)?);
        let last_update_time = reader.read_u64::<LittleEndian>()?;
        let error_message = read_optional(&mut reader, |r| read_string(r))?;
        Ok(TransactionRecord {
            id,
            tx_hash,
            status,
            block,
            ordinal,
            digest,
            last_update_time,
            error_message,
        })
    }
}

impl BlockRecord {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.hash.as_bytes())?;
        writer.write_u64::<LittleEndian>(self.height.into())?;
        writer.write_u64::<LittleEndian>(self.epoch)?;
        writer.write_u64::<LittleEndian>(self.slot)?;
        writer.write_u64::<LittleEndian>(self.time)
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let hash = BlockHash::from_bytes(read_hash32(&mut reader)?);
        let height = BlockHeight::from_u64(reader.read_u64::<LittleEndian>()?);
        let epoch = reader.read_u64::<LittleEndian>()?;
        let slot = reader.read_u64::<LittleEndian>()?;
        let time = reader.read_u64::<LittleEndian>()?;
        Ok(BlockRecord {
            hash,
            height,
            epoch,
            slot,
            time,
        })
    }
}

impl UtxoOutput {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.output_id.transaction().into())?;
        writer.write_u32::<LittleEndian>(self.output_id.index())?;
        writer.write_u64::<LittleEndian>(self.address.into())?;
        writer.write_u64::<LittleEndian>(self.value)?;
        self.spend.write(&mut writer)
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let transaction = TransactionId::from_u64(reader.read_u64::<LittleEndian>()?);
        let index = reader.read_u32::<LittleEndian>()?;
        let address = AddressId::from_u64(reader.read_u64::<LittleEndian>()?);
        let value = reader.read_u64::<LittleEndian>()?;
        let spend = SpendStatus::read(&mut reader)?;
        Ok(UtxoOutput {
            output_id: OutputId::from_parts(transaction, index),
            address,
            value,
            spend,
        })
    }
}

impl UtxoInput {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.transaction.into())?;
        writer.write_u32::<LittleEndian>(self.index)?;
        writer.write_all(self.spends.tx_hash().as_bytes())?;
        writer.write_u32::<LittleEndian>(self.spends.index())
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let transaction = TransactionId::from_u64(reader.read_u64::<LittleEndian>()?);
        let index = reader.read_u32::<LittleEndian>()?;
        let spends_hash = TxHash::from_bytes(read_hash32(&mut reader)?);
        let spends_index = reader.read_u32::<LittleEndian>()?;
        Ok(UtxoInput {
            transaction,
            index,
            spends: OutPoint::from_parts(spends_hash, spends_index),
        })
    }
}

impl CertificateRecord {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.transaction.into())?;
        writer.write_u8(self.kind.tag())?;
        write_bytes(&mut writer, &self.payload)?;
        writer.write_u64::<LittleEndian>(self.staking_address.into())
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let transaction = TransactionId::from_u64(reader.read_u64::<LittleEndian>()?);
        let kind =
            CertificateKind::from_tag(reader.read_u8()?).ok_or_else(|| bad_data("bad certificate tag"))?;
        let payload = read_bytes(&mut reader)?;
        let staking_address = AddressId::from_u64(reader.read_u64::<LittleEndian>()?);
        Ok(CertificateRecord {
            transaction,
            kind,
            payload,
            staking_address,
        })
    }
}

impl LastSyncInfo {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.wallet.into())?;
        write_optional(&mut writer, &self.block, |w, block| w.write_all(block.as_bytes()))?;
        writer.write_u64::<LittleEndian>(self.height.into())?;
        write_optional(&mut writer, &self.slot, |w, slot| {
            w.write_u64::<LittleEndian>(*slot)
        })?;
        write_optional(&mut writer, &self.time, |w, time| {
            w.write_u64::<LittleEndian>(*time)
        })
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let wallet = WalletId::from_u32(reader.read_u32::<LittleEndian>()?);
        let block = read_optional(&mut reader, |r| Ok(BlockHash::from_bytes(read_hash32(r)?)))?;
        let height = BlockHeight::from_u64(reader.read_u64::<LittleEndian>()?);
        let slot = read_optional(&mut reader, |r| r.read_u64::<LittleEndian>())?;
        let time = read_optional(&mut reader, |r| r.read_u64::<LittleEndian>())?;
        Ok(LastSyncInfo {
            wallet,
            block,
            height,
            slot,
            time,
        })
    }
}

impl Tables {
    pub fn serialized_version() -> u64 {
        1
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(Self::serialized_version())?;

        writer.write_u64::<LittleEndian>(self.addresses.len() as u64)?;
        for address in self.addresses.values() {
            address.write(&mut writer)?;
        }

        writer.write_u64::<LittleEndian>(self.transactions.len() as u64)?;
        for record in self.transactions.values() {
            record.write(&mut writer)?;
        }

        writer.write_u64::<LittleEndian>(self.blocks.len() as u64)?;
        for block in self.blocks.values() {
            block.write(&mut writer)?;
        }

        writer.write_u64::<LittleEndian>(self.utxo_outputs.len() as u64)?;
        for output in self.utxo_outputs.values() {
            output.write(&mut writer)?;
        }

        writer.write_u64::<LittleEndian>(self.utxo_inputs.len() as u64)?;
        for input in self.utxo_inputs.values() {
            input.write(&mut writer)?;
        }

        let certificate_count: u64 = self.certificates.values().map(|rows| rows.len() as u64).sum();
        writer.write_u64::<LittleEndian>(certificate_count)?;
        for rows in self.certificates.values() {
            for certificate in rows {
                certificate.write(&mut writer)?;
            }
        }

        writer.write_u64::<LittleEndian>(self.last_sync.len() as u64)?;
        for info in self.last_sync.values() {
            info.write(&mut writer)?;
        }

        writer.write_u64::<LittleEndian>(self.next_address_id)?;
        writer.write_u64::<LittleEndian>(self.next_transaction_id)
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let version = reader.read_u64::<LittleEndian>()?;
        if version != Self::serialized_version() {
            return Err(bad_data(&format!("can't read mirror version {}", version)));
        }

        let mut tables = Tables::new();

        let address_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..address_count {
            let address = Address::read(&mut reader)?;
            tables.address_ids_by_hash.insert(address.hash, address.id);
            tables.addresses.insert(address.id, address);
        }

        let transaction_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..transaction_count {
            let record = TransactionRecord::read(&mut reader)?;
            tables.transaction_ids_by_hash.insert(record.tx_hash, record.id);
            tables.transactions.insert(record.id, record);
        }

        let block_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..block_count {
            let block = BlockRecord::read(&mut reader)?;
            tables.blocks.insert(block.hash, block);
        }

        let output_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..output_count {
            let output = UtxoOutput::read(&mut reader)?;
            tables.utxo_outputs.insert(output.output_id, output);
        }

        let input_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..input_count {
            let input = UtxoInput::read(&mut reader)?;
            tables.utxo_inputs.insert((input.transaction, input.index), input);
        }

        let certificate_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..certificate_count {
            let certificate = CertificateRecord::read(&mut reader)?;
            tables
                .certificates
                .entry(certificate.transaction)
                .or_default()
                .push(certificate);
        }

        let cursor_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..cursor_count {
            let info = LastSyncInfo::read(&mut reader)?;
            tables.last_sync.insert(info.wallet, info);
        }

        tables.next_address_id = reader.read_u64::<LittleEndian>()?;
        tables.next_transaction_id = reader.read_u64::<LittleEndian>()?;

        Ok(tables)
    }
}
