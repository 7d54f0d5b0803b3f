use super::{PathPosition, SceError};
use crate::cip::ASSEMBLY_CLASS;
use crate::config::Role;
use crate::epath::{EPathFields, FieldMask};

/// Accepted application path shapes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppPathFormat {
    /// Three classes, three instances.
    Long,
    /// One class, one instance, two connection points.
    Compressed,
    /// One class, three instances. Only accepted in the originator role.
    CompressedWithInstances,
}

impl AppPathFormat {
    /// Shapes in the order they are tried.
    const PRIORITY: [AppPathFormat; 3] = [
        AppPathFormat::Long,
        AppPathFormat::Compressed,
        AppPathFormat::CompressedWithInstances,
    ];

    /// Segments every path of this shape carries.
    pub const fn required(self) -> FieldMask {
        match self {
            AppPathFormat::Long => FieldMask::CLASS1
                .union(FieldMask::CLASS2)
                .union(FieldMask::CLASS3)
                .union(FieldMask::INST1)
                .union(FieldMask::INST2)
                .union(FieldMask::INST3),
            AppPathFormat::Compressed => FieldMask::CLASS1
                .union(FieldMask::INST1)
                .union(FieldMask::CP1)
                .union(FieldMask::CP2),
            AppPathFormat::CompressedWithInstances => FieldMask::CLASS1
                .union(FieldMask::INST1)
                .union(FieldMask::INST2)
                .union(FieldMask::INST3),
        }
    }

    /// Segments a path of any shape may carry besides the required ones.
    pub const OPTIONAL: FieldMask = FieldMask::DATA_SEGMENT;

    const fn accepted_in(self, role: Role) -> bool {
        match self {
            AppPathFormat::CompressedWithInstances => matches!(role, Role::Originator),
            _ => true,
        }
    }
}

/// Segments checked outside the application path shape.
const NON_SHAPE: FieldMask = FieldMask::ELECTRONIC_KEY.union(FieldMask::NET_SEGMENT);

/// Match a path mask against the accepted shapes in priority order. When
/// several shapes match, the first one wins and the segments of the others
/// are ignored.
///
/// # Errors
/// - [`SceError::AppPathShape`] if no shape's required segments are present
/// - [`SceError::UnexpectedSegments`] if segments no matching shape uses are left over
pub fn classify_app_path(mask: FieldMask, role: Role) -> Result<AppPathFormat, SceError> {
    let shape = mask.outside(NON_SHAPE);
    let mut matching = AppPathFormat::PRIORITY
        .into_iter()
        .filter(|format| format.accepted_in(role) && shape.contains(format.required()));
    let format = matching.next().ok_or(SceError::AppPathShape(shape))?;
    let covered = matching.fold(format.required(), |covered, other| {
        covered.union(other.required())
    });

    let extra = shape.outside(covered.union(AppPathFormat::OPTIONAL));
    if !extra.is_empty() {
        return Err(SceError::UnexpectedSegments(extra));
    }
    Ok(format)
}

/// Application path with the compressed shapes expanded, so every path has a
/// class and an instance per position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AppPath {
    pub format: AppPathFormat,
    classes: [u32; 3],
    instances: [u32; 3],
}

impl AppPath {
    /// # Errors
    /// - if the fields do not carry what `format` requires
    pub fn from_fields(format: AppPathFormat, fields: &EPathFields<'_>) -> Result<Self, SceError> {
        let slot = |values: &[u32], index: usize| {
            values
                .get(index)
                .copied()
                .ok_or(SceError::AppPathShape(fields.mask()))
        };
        let class1 = slot(&fields.classes, 0)?;
        let (classes, instances) = match format {
            AppPathFormat::Long => (
                [class1, slot(&fields.classes, 1)?, slot(&fields.classes, 2)?],
                [
                    slot(&fields.instances, 0)?,
                    slot(&fields.instances, 1)?,
                    slot(&fields.instances, 2)?,
                ],
            ),
            AppPathFormat::Compressed => (
                [class1; 3],
                [
                    slot(&fields.instances, 0)?,
                    slot(&fields.connection_points, 0)?,
                    slot(&fields.connection_points, 1)?,
                ],
            ),
            AppPathFormat::CompressedWithInstances => (
                [class1; 3],
                [
                    slot(&fields.instances, 0)?,
                    slot(&fields.instances, 1)?,
                    slot(&fields.instances, 2)?,
                ],
            ),
        };
        Ok(Self {
            format,
            classes,
            instances,
        })
    }

    /// Every class must be the Assembly class and every instance must fit 16 bits.
    pub fn check(&self) -> Result<(), SceError> {
        for (position, (class, instance)) in PathPosition::ALL
            .into_iter()
            .zip(self.classes.iter().zip(self.instances.iter()))
        {
            if *class != ASSEMBLY_CLASS {
                return Err(SceError::WrongClass(position, *class));
            }
            if *instance > u32::from(u16::MAX) {
                return Err(SceError::InstanceRange(position, *instance));
            }
        }
        Ok(())
    }

    pub fn class(&self, position: PathPosition) -> u32 {
        self.classes[position as usize]
    }

    /// Instance at `position`. Truncates; call [`AppPath::check`] first.
    pub fn instance(&self, position: PathPosition) -> u16 {
        self.instances[position as usize] as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epath::{PathEncoding, parse};

    fn long_mask() -> FieldMask {
        AppPathFormat::Long.required() | FieldMask::NET_SEGMENT
    }

    #[test]
    fn test_shapes_in_priority_order() {
        assert_eq!(classify_app_path(long_mask(), Role::Target), Ok(AppPathFormat::Long));
        let compressed = AppPathFormat::Compressed.required() | FieldMask::NET_SEGMENT;
        assert_eq!(
            classify_app_path(compressed | FieldMask::DATA_SEGMENT, Role::Target),
            Ok(AppPathFormat::Compressed)
        );
        assert_eq!(
            classify_app_path(compressed | FieldMask::ELECTRONIC_KEY, Role::Originator),
            Ok(AppPathFormat::Compressed)
        );
    }

    #[test]
    fn test_compressed_with_instances_is_originator_only() {
        let mask = AppPathFormat::CompressedWithInstances.required();
        assert_eq!(
            classify_app_path(mask, Role::Originator),
            Ok(AppPathFormat::CompressedWithInstances)
        );
        assert_eq!(
            classify_app_path(mask, Role::Target),
            Err(SceError::AppPathShape(mask))
        );
    }

    #[test]
    fn test_long_path_wins_over_compressed() {
        let mask = AppPathFormat::Long.required() | AppPathFormat::Compressed.required();
        assert_eq!(classify_app_path(mask, Role::Target), Ok(AppPathFormat::Long));
        // a lone connection point belongs to no matching shape
        assert_eq!(
            classify_app_path(long_mask() | FieldMask::CP1, Role::Target),
            Err(SceError::UnexpectedSegments(FieldMask::CP1))
        );
    }

    #[test]
    fn test_attribute_is_not_optional() {
        let mask = long_mask() | FieldMask::ATTRIBUTE;
        assert_eq!(
            classify_app_path(mask, Role::Target),
            Err(SceError::UnexpectedSegments(FieldMask::ATTRIBUTE))
        );
    }

    #[test]
    fn test_compressed_path_is_expanded() {
        // class 4, instance 0x64, connection points 0x96 and 0xC8
        let bytes = [0x20, 0x04, 0x24, 0x64, 0x2C, 0x96, 0x2C, 0xC8];
        let fields = parse(&bytes, PathEncoding::Padded, bytes.len()).unwrap();
        let format = classify_app_path(fields.mask(), Role::Target).unwrap();
        let path = AppPath::from_fields(format, &fields).unwrap();
        assert_eq!(path.check(), Ok(()));
        assert_eq!(path.class(PathPosition::Producing), ASSEMBLY_CLASS);
        assert_eq!(path.instance(PathPosition::Config), 0x64);
        assert_eq!(path.instance(PathPosition::Consuming), 0x96);
        assert_eq!(path.instance(PathPosition::Producing), 0xC8);
    }

    #[test]
    fn test_class_and_instance_checks() {
        let bytes = [
            0x20, 0x04, 0x24, 0x01, 0x20, 0x05, 0x24, 0x02, 0x20, 0x04, 0x24, 0x03,
        ];
        let fields = parse(&bytes, PathEncoding::Padded, bytes.len()).unwrap();
        let path = AppPath::from_fields(AppPathFormat::Long, &fields).unwrap();
        assert_eq!(path.check(), Err(SceError::WrongClass(PathPosition::Consuming, 0x05)));

        let bytes = [
            0x20, 0x04, 0x24, 0x01, 0x20, 0x04, 0x24, 0x02, 0x20, 0x04, 0x26, 0x00, 0x00, 0x00,
            0x01, 0x00,
        ];
        let fields = parse(&bytes, PathEncoding::Padded, bytes.len()).unwrap();
        let path = AppPath::from_fields(AppPathFormat::Long, &fields).unwrap();
        assert_eq!(
            path.check(),
            Err(SceError::InstanceRange(PathPosition::Producing, 0x0001_0000))
        );
    }
}
