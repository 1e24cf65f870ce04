use crate::error::GroupingError;
use crate::tuple::{Fields, TaskId, Value, digest_values};

/// Routes records with equal projections onto the same task.
///
/// The bucket is the FNV-1a digest of the selected values modulo the number
/// of targets, so the mapping depends only on the values and the sorted
/// target set.
#[derive(Clone, Debug)]
pub struct FieldsGrouper {
  positions: Vec<usize>,
  targets: Vec<TaskId>,
}

impl FieldsGrouper {
  pub(crate) fn new(
    stream: &str,
    out_fields: &Fields,
    group_fields: &[String],
    targets: Vec<TaskId>,
  ) -> Result<Self, GroupingError> {
    if group_fields.is_empty() {
      return Err(GroupingError::EmptyFields {
        stream: stream.to_string(),
      });
    }
    let positions = group_fields
      .iter()
      .map(|field| {
        out_fields
          .index_of(field)
          .ok_or_else(|| GroupingError::UnknownField {
            field: field.clone(),
            stream: stream.to_string(),
          })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { positions, targets })
  }

  /// Positions of the grouping fields within the source schema.
  pub fn positions(&self) -> &[usize] {
    &self.positions
  }

  pub(crate) fn choose(&self, values: &[Value]) -> TaskId {
    let digest = digest_values(
      self
        .positions
        .iter()
        .map(|&i| values.get(i).unwrap_or(&Value::Null)),
    );
    let bucket = (digest % self.targets.len() as u64) as usize;
    self.targets[bucket]
  }
}
